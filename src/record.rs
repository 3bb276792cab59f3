//! Record layout and the composite key ordering.
//!
//! Every line has the shape `<number>.<space><text>`. Records are ordered by their text part first
//! (ordinal, case-insensitive) and by their numeric prefix when the text parts are equal.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;

/// Character separating the numeric prefix from the text part.
pub const SEPARATOR: u8 = b'.';

const EXCERPT_LEN: usize = 64;

/// Record parsing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The line contains no separator.
    MissingSeparator(String),
    /// The numeric prefix is empty, not a decimal number or does not fit into `u64`.
    InvalidNumber(String),
    /// The separator is not followed by a delimiter character.
    MissingDelimiter(String),
}

impl RecordError {
    fn excerpt(line: &[u8]) -> String {
        let cut = line.len().min(EXCERPT_LEN);
        let mut excerpt = String::from_utf8_lossy(&line[..cut]).into_owned();
        if cut < line.len() {
            excerpt.push_str("...");
        }
        excerpt
    }
}

impl Error for RecordError {}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::MissingSeparator(line) => write!(f, "separator not found in line '{}'", line),
            RecordError::InvalidNumber(line) => write!(f, "numeric prefix is not a valid number in line '{}'", line),
            RecordError::MissingDelimiter(line) => write!(f, "no delimiter after separator in line '{}'", line),
        }
    }
}

/// Precomputed record layout: separator offset and parsed numeric prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Offset of the separator inside the line.
    pub separator: usize,
    /// Numeric prefix value.
    pub number: u64,
}

impl Layout {
    /// Parses a line (without the line terminator).
    pub fn parse(line: &[u8]) -> Result<Layout, RecordError> {
        let separator = line
            .iter()
            .position(|&b| b == SEPARATOR)
            .ok_or_else(|| RecordError::MissingSeparator(RecordError::excerpt(line)))?;

        let digits = &line[..separator];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(RecordError::InvalidNumber(RecordError::excerpt(line)));
        }

        let mut number: u64 = 0;
        for &digit in digits {
            number = number
                .checked_mul(10)
                .and_then(|n| n.checked_add(u64::from(digit - b'0')))
                .ok_or_else(|| RecordError::InvalidNumber(RecordError::excerpt(line)))?;
        }

        match line.get(separator + 1) {
            Some(b' ') | Some(b'\t') => {}
            _ => return Err(RecordError::MissingDelimiter(RecordError::excerpt(line))),
        }

        return Ok(Layout { separator, number });
    }

    /// Returns the key of `line`, which must be the line this layout was parsed from.
    pub fn key<'a>(&self, line: &'a str) -> Key<'a> {
        Key {
            number: self.number,
            // separator and delimiter are single byte characters, so the offset is a char boundary
            text: &line[self.separator + 2..],
        }
    }
}

/// Composite sort key.
#[derive(Debug, Clone, Copy)]
pub struct Key<'a> {
    pub number: u64,
    pub text: &'a str,
}

impl Ord for Key<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ignore_case(self.text, other.text).then(self.number.cmp(&other.number))
    }
}

impl PartialOrd for Key<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key<'_> {}

/// Ordinal case-insensitive string comparison. Characters are compared by their upper case form.
pub fn compare_ignore_case(left: &str, right: &str) -> Ordering {
    if left.is_ascii() && right.is_ascii() {
        return left
            .bytes()
            .map(|b| b.to_ascii_uppercase())
            .cmp(right.bytes().map(|b| b.to_ascii_uppercase()));
    }

    left.chars().map(fold_case).cmp(right.chars().map(fold_case))
}

fn fold_case(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(single), None) => single,
        // multi-character mappings (e.g. 'ß') compare as themselves
        _ => c,
    }
}

/// An owned line together with its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    text: String,
    layout: Layout,
}

impl Line {
    /// Parses an owned line.
    pub fn parse(text: String) -> Result<Line, RecordError> {
        let layout = Layout::parse(text.as_bytes())?;
        Ok(Line { text, layout })
    }

    pub fn key(&self) -> Key<'_> {
        self.layout.key(&self.text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{compare_ignore_case, Layout, Line, RecordError};

    fn line(text: &str) -> Line {
        Line::parse(text.to_string()).unwrap()
    }

    #[rstest]
    #[case("415. Apple", 3, 415)]
    #[case("0. Something something", 1, 0)]
    #[case("18446744073709551615. Max", 20, u64::MAX)]
    fn test_layout_parse(#[case] text: &str, #[case] separator: usize, #[case] number: u64) {
        let layout = Layout::parse(text.as_bytes()).unwrap();
        assert_eq!(layout, Layout { separator, number });
    }

    #[rstest]
    #[case("Apple", RecordError::MissingSeparator("Apple".to_string()))]
    #[case("", RecordError::MissingSeparator("".to_string()))]
    #[case(". Apple", RecordError::InvalidNumber(". Apple".to_string()))]
    #[case("1a. Apple", RecordError::InvalidNumber("1a. Apple".to_string()))]
    #[case("-1. Apple", RecordError::InvalidNumber("-1. Apple".to_string()))]
    #[case("18446744073709551616. Apple", RecordError::InvalidNumber("18446744073709551616. Apple".to_string()))]
    #[case("1.Apple", RecordError::MissingDelimiter("1.Apple".to_string()))]
    #[case("1.", RecordError::MissingDelimiter("1.".to_string()))]
    fn test_layout_parse_malformed(#[case] text: &str, #[case] expected: RecordError) {
        assert_eq!(Layout::parse(text.as_bytes()), Err(expected));
    }

    #[test]
    fn test_error_excerpt_truncated() {
        let text = "x".repeat(200);
        match Layout::parse(text.as_bytes()) {
            Err(RecordError::MissingSeparator(excerpt)) => assert_eq!(excerpt.len(), 64 + 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_key_text_excludes_separator_and_delimiter() {
        let line = line("30.  Two spaces");
        assert_eq!(line.key().text, " Two spaces");
        assert_eq!(line.key().number, 30);
    }

    #[rstest]
    #[case("1. Apple", "2. Apple", Ordering::Less)]
    #[case("10. Apple", "2. Apple", Ordering::Greater)]
    #[case("5. apple", "5. APPLE", Ordering::Equal)]
    #[case("999. Apple", "1. Banana", Ordering::Less)]
    #[case("1. banana", "3. Banana", Ordering::Less)]
    #[case("2. Apple", "1. Apple is red", Ordering::Less)]
    #[case("18446744073709551615. Apple", "0. Apple", Ordering::Greater)]
    #[case("0. Apple", "18446744073709551615. Apple", Ordering::Less)]
    fn test_key_order(#[case] left: &str, #[case] right: &str, #[case] expected: Ordering) {
        assert_eq!(line(left).key().cmp(&line(right).key()), expected);
        assert_eq!(line(right).key().cmp(&line(left).key()), expected.reverse());
    }

    #[test]
    fn test_text_order_ignores_number() {
        let words = ["apple", "Banana", "cherry", "Date"];
        for (i, left) in words.iter().enumerate() {
            for (j, right) in words.iter().enumerate() {
                let left = line(&format!("{}. {}", 1000 - i, left));
                let right = line(&format!("{}. {}", j, right));
                // equal texts fall back to the numbers, and the left one is always larger
                let expected = if i == j { Ordering::Greater } else { i.cmp(&j) };
                assert_eq!(left.key().cmp(&right.key()), expected);
            }
        }
    }

    #[rstest]
    #[case("abc", "ABC", Ordering::Equal)]
    #[case("abc", "abd", Ordering::Less)]
    #[case("ab", "abc", Ordering::Less)]
    #[case("Zebra", "apple", Ordering::Greater)]
    #[case("äpfel", "ÄPFEL", Ordering::Equal)]
    #[case("straße", "STRASSE", Ordering::Greater)]
    fn test_compare_ignore_case(#[case] left: &str, #[case] right: &str, #[case] expected: Ordering) {
        assert_eq!(compare_ignore_case(left, right), expected);
    }
}
