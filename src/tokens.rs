use regex::Regex;
use std::fmt;

#[derive(Debug, Eq, PartialEq)]
pub enum SpecialChar {
    OpenRoundBracket,
    CloseRoundBracket,
    Quote,
    Backtick,
    Comma,
}

#[derive(Debug, PartialEq)]
pub enum Token<'a> {
    UnquoteSplicing,
    SpecialChar(SpecialChar),
    StringLiteral(&'a str),
    Comment(&'a str),
    PlainChars(&'a str),
}

#[derive(Debug, PartialEq)]
pub enum TokenizerError {
    UnbalancedString,
    NoCapture(String),
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizerError::UnbalancedString => write!(f, "unbalanced string literal"),
            TokenizerError::NoCapture(rest) => write!(f, "cannot tokenize {:?}", rest),
        }
    }
}

fn create_token(captured: &str) -> Result<Token, TokenizerError> {
    use SpecialChar::*;
    match captured.as_bytes() {
        b",@" => Ok(Token::UnquoteSplicing),
        b"(" => Ok(Token::SpecialChar(OpenRoundBracket)),
        b")" => Ok(Token::SpecialChar(CloseRoundBracket)),
        b"'" => Ok(Token::SpecialChar(Quote)),
        b"`" => Ok(Token::SpecialChar(Backtick)),
        b"," => Ok(Token::SpecialChar(Comma)),
        [b'"', ..] => tokenize_string_literal(captured),
        // ; is ASCII so slicing past it is safe whatever follows.
        [b';', ..] => Ok(Token::Comment(&captured[1..])),
        _ => Ok(Token::PlainChars(captured)),
    }
}

fn tokenize_string_literal(captured: &str) -> Result<Token, TokenizerError> {
    let bytes = captured.as_bytes();
    if bytes.len() == 1 || bytes[bytes.len() - 1] != b'"' {
        return Err(TokenizerError::UnbalancedString);
    }

    let trailing_backslashes = bytes
        .iter()
        .rev()
        .skip(1)
        .take_while(|&&byte| byte == b'\\')
        .count();
    if trailing_backslashes % 2 == 1 {
        return Err(TokenizerError::UnbalancedString);
    }

    Ok(Token::StringLiteral(&captured[1..captured.len() - 1]))
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, TokenizerError> {
    lazy_static! {
        static ref TOKEN_RE: Regex = Regex::new(
            r#"(?x)                          # ignore whitespace in this pattern & allow comments
                \s*                          # leading whitespace, ignored
                (                            # token capture group
                    ,@                       # unquote-splicing
                    |[()'`,]                 # single special characters
                    |"(?:                    # string literal. its contents, not captured, include:
                        \\.                  #    escapes
                        |[^\\"]              #    anything which isn't a backslash or a quote
                      )*
                      "?                     #    possibly missing a closing quote
                    |;.*                     # comments
                    |[^\s('"`,;)]*           # zero or more plain characters
                )
                \s*                          # trailing whitespace, ignored
            "#
        )
        .expect("token regex is valid");
    }
    let mut input = input;
    let mut tokens = Vec::new();
    while !input.is_empty() {
        let caps = TOKEN_RE
            .captures(input)
            .ok_or_else(|| TokenizerError::NoCapture(String::from(input)))?;
        let (whole, token) = match (caps.get(0), caps.get(1)) {
            (Some(whole), Some(token)) if whole.end() > 0 => (whole, token),
            _ => return Err(TokenizerError::NoCapture(String::from(input))),
        };
        if !token.as_str().is_empty() {
            tokens.push(create_token(token.as_str())?);
        }
        input = &input[whole.end()..];
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_macros_and_brackets() {
        use SpecialChar::*;
        let tokens = tokenize("`(a ,b ,@c 'd)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::SpecialChar(Backtick),
                Token::SpecialChar(OpenRoundBracket),
                Token::PlainChars("a"),
                Token::SpecialChar(Comma),
                Token::PlainChars("b"),
                Token::UnquoteSplicing,
                Token::PlainChars("c"),
                Token::SpecialChar(Quote),
                Token::PlainChars("d"),
                Token::SpecialChar(CloseRoundBracket),
            ]
        );
    }

    #[test]
    fn strings_and_comments() {
        let tokens = tokenize("\"a \\\"q\\\"\" ; trailing words\n x").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::StringLiteral("a \\\"q\\\""),
                Token::Comment(" trailing words"),
                Token::PlainChars("x"),
            ]
        );
        assert_eq!(tokenize("\"open"), Err(TokenizerError::UnbalancedString));
        assert_eq!(tokenize("\"open\\\""), Err(TokenizerError::UnbalancedString));
    }

    #[test]
    fn blank_input_has_no_tokens() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   \n\t ").unwrap().is_empty());
    }
}
