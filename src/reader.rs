use crate::strings::{build_string, EscapeError};
use crate::tokens::{tokenize, SpecialChar, Token, TokenizerError};
use crate::types::{MInt, Value};
use std::fmt;
use std::iter::Peekable;
use std::rc::Rc;
use std::slice;

type Reader<'a> = Peekable<slice::Iter<'a, Token<'a>>>;

#[derive(Debug, PartialEq)]
pub enum Error {
    Tokenizer(TokenizerError),
    Escape(EscapeError),
    NoMoreTokens,
    UnclosedList,
    UnexpectedCloseBracket,
    BadDottedPair,
    BadNumber(String),
    TrailingInput,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Tokenizer(e) => write!(f, "{}", e),
            Error::Escape(e) => write!(f, "{}", e),
            Error::NoMoreTokens => write!(f, "no input to read"),
            Error::UnclosedList => write!(f, "unclosed list"),
            Error::UnexpectedCloseBracket => write!(f, "unexpected )"),
            Error::BadDottedPair => write!(f, "malformed dotted pair"),
            Error::BadNumber(s) => write!(f, "cannot read {} as a number", s),
            Error::TrailingInput => write!(f, "more than one form in input"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether more input could complete the form, as when a REPL line
    /// leaves a list or string open.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Error::UnclosedList | Error::Tokenizer(TokenizerError::UnbalancedString)
        )
    }
}

fn significant_tokens(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = tokenize(input).map_err(Error::Tokenizer)?;
    tokens.retain(|t| !matches!(t, Token::Comment(_)));
    Ok(tokens)
}

/// Reads exactly one form.
pub fn read_str(input: &str) -> Result<Value, Error> {
    let tokens = significant_tokens(input)?;
    let mut reader = tokens.iter().peekable();
    let form = read_form(&mut reader)?;
    match reader.peek() {
        None => Ok(form),
        Some(_) => Err(Error::TrailingInput),
    }
}

/// Reads every form in `input`, e.g. a whole source file.
pub fn read_all(input: &str) -> Result<Vec<Value>, Error> {
    let tokens = significant_tokens(input)?;
    let mut reader = tokens.iter().peekable();
    let mut forms = Vec::new();
    while reader.peek().is_some() {
        forms.push(read_form(&mut reader)?);
    }
    Ok(forms)
}

fn read_form(reader: &mut Reader) -> Result<Value, Error> {
    use SpecialChar::*;
    let wrap = |reader: &mut Reader, wrapper: fn(Rc<Value>) -> Value| {
        read_form(reader).map(|form| wrapper(Rc::new(form)))
    };
    match reader.next() {
        Some(Token::SpecialChar(OpenRoundBracket)) => read_list(reader),
        Some(Token::SpecialChar(CloseRoundBracket)) => Err(Error::UnexpectedCloseBracket),
        Some(Token::SpecialChar(Quote)) => wrap(reader, Value::Quote),
        Some(Token::SpecialChar(Backtick)) => wrap(reader, Value::Quasiquote),
        Some(Token::SpecialChar(Comma)) => wrap(reader, Value::Unquote),
        Some(Token::UnquoteSplicing) => wrap(reader, Value::UnquoteSplicing),
        Some(Token::StringLiteral(s)) => build_string(s).map(Value::String).map_err(Error::Escape),
        Some(Token::PlainChars(chars)) => read_atom(chars),
        Some(Token::Comment(_)) => read_form(reader),
        None => Err(Error::NoMoreTokens),
    }
}

fn read_list(reader: &mut Reader) -> Result<Value, Error> {
    let mut elements = Vec::new();
    loop {
        match reader.peek() {
            None => return Err(Error::UnclosedList),
            Some(Token::SpecialChar(SpecialChar::CloseRoundBracket)) => {
                reader.next();
                return Ok(Value::list(elements));
            }
            Some(Token::PlainChars(chars)) if *chars == "." => {
                reader.next();
                return read_dotted_tail(reader, elements);
            }
            Some(_) => elements.push(read_element(reader)?),
        }
    }
}

fn read_element(reader: &mut Reader) -> Result<Value, Error> {
    match read_form(reader) {
        Err(Error::NoMoreTokens) => Err(Error::UnclosedList),
        other => other,
    }
}

fn read_dotted_tail(reader: &mut Reader, elements: Vec<Value>) -> Result<Value, Error> {
    if elements.is_empty() {
        return Err(Error::BadDottedPair);
    }
    let tail = read_element(reader)?;
    match reader.next() {
        Some(Token::SpecialChar(SpecialChar::CloseRoundBracket)) => {
            Ok(Value::list_with_tail(elements, tail))
        }
        None => Err(Error::UnclosedList),
        Some(_) => Err(Error::BadDottedPair),
    }
}

fn looks_numeric(chars: &str) -> bool {
    let mut bytes = chars.bytes();
    match bytes.next() {
        Some(b'0'..=b'9') => true,
        Some(b'+') | Some(b'-') => matches!(bytes.next(), Some(b'0'..=b'9')),
        _ => false,
    }
}

fn read_atom(chars: &str) -> Result<Value, Error> {
    match chars {
        "#t" => return Ok(Value::Bool(true)),
        "#f" => return Ok(Value::Bool(false)),
        "nil" => return Ok(Value::Nil),
        "." => return Err(Error::BadDottedPair),
        _ => {}
    }
    if !looks_numeric(chars) {
        return Ok(Value::symbol(chars));
    }
    if let Ok(int) = chars.parse::<MInt>() {
        return Ok(Value::Int(int));
    }
    chars
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| Error::BadNumber(chars.to_string()))
}
