// String literals understand exactly four escapes: \\, \", \n and \t. The same
// table drives reading and readable printing so the two stay inverse.

use bimap::BiMap;
use std::fmt;
use std::str::Chars;

lazy_static! {
    static ref ESCAPES: BiMap<char, char> = {
        let mut m = BiMap::new();
        m.insert('\\', '\\');
        m.insert('"', '"');
        m.insert('n', '\n');
        m.insert('t', '\t');
        m
    };
}

struct StringBuilder<'a> {
    chars: Chars<'a>,
}

impl<'a> StringBuilder<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.chars() }
    }
}

#[derive(Debug, PartialEq)]
pub enum EscapeError {
    UnknownEscape(char),
    UnexpectedSingleBackslash,
}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeError::UnknownEscape(c) => write!(f, "unknown escape \\{}", c),
            EscapeError::UnexpectedSingleBackslash => write!(f, "string ends with a lone backslash"),
        }
    }
}

impl Iterator for StringBuilder<'_> {
    type Item = std::result::Result<char, EscapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.chars.next()? {
            '\\' => match self.chars.next() {
                None => Err(EscapeError::UnexpectedSingleBackslash),
                Some(c) => ESCAPES
                    .get_by_left(&c)
                    .copied()
                    .ok_or(EscapeError::UnknownEscape(c)),
            },
            c => Ok(c),
        };
        Some(result)
    }
}

/// Turns the body of a string literal into the string it denotes.
pub(crate) fn build_string(src: &str) -> Result<String, EscapeError> {
    StringBuilder::new(src).collect()
}

struct StringPrinter<'a> {
    chars: Chars<'a>,
}

impl<'a> StringPrinter<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.chars() }
    }
}

impl Iterator for StringPrinter<'_> {
    type Item = (char, Option<char>);

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.chars.next()?;
        let charseq = match ESCAPES.get_by_right(&next) {
            Some(&l) => ('\\', Some(l)),
            None => (next, None),
        };
        Some(charseq)
    }
}

/// The quoted literal that reads back as `src`.
pub(crate) fn string_repr(src: &str) -> String {
    let mut output = String::with_capacity(src.len() + 2);
    output.push('"');
    for (char1, char2) in StringPrinter::new(src) {
        output.push(char1);
        if let Some(char2) = char2 {
            output.push(char2)
        };
    }
    output.push('"');
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_are_decoded() {
        assert_eq!(build_string(r#"a\nb\tc\\d\"e"#).unwrap(), "a\nb\tc\\d\"e");
        assert_eq!(build_string(r"\q"), Err(EscapeError::UnknownEscape('q')));
        assert_eq!(build_string("x\\"), Err(EscapeError::UnexpectedSingleBackslash));
    }

    #[test]
    fn repr_reads_back() {
        let original = "tab\there \"quoted\" back\\slash\n";
        let repr = string_repr(original);
        assert_eq!(repr, r#""tab\there \"quoted\" back\\slash\n""#);
        assert_eq!(build_string(&repr[1..repr.len() - 1]).unwrap(), original);
    }
}
