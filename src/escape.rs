//! Escape codec for string literals.
//!
//! [`decode`] turns the raw text between the quotes of a string literal into the string
//! value it denotes; [`encode`] is its exact inverse and is used whenever a string value
//! is printed back as source. Both work over the same fixed escape set:
//! `\a \b \f \n \r \t \v \" \\`.

/// Escape letter paired with the character it stands for.
const ESCAPES: [(char, char); 9] = [
    ('a', '\u{07}'),
    ('b', '\u{08}'),
    ('f', '\u{0C}'),
    ('n', '\n'),
    ('r', '\r'),
    ('t', '\t'),
    ('v', '\u{0B}'),
    ('"', '"'),
    ('\\', '\\'),
];

/// A backslash in raw literal text that does not start a known escape sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid escape sequence in string at offset {offset}")]
pub struct InvalidEscape {
    /// Byte offset of the offending backslash within the raw text
    pub offset: usize,
    /// The character following the backslash, `None` if the text ended there
    pub found: Option<char>,
}

fn unescaped(letter: char) -> Option<char> {
    ESCAPES
        .iter()
        .find(|(escape, _)| *escape == letter)
        .map(|(_, ch)| *ch)
}

fn escape_letter(ch: char) -> Option<char> {
    ESCAPES
        .iter()
        .find(|(_, original)| *original == ch)
        .map(|(letter, _)| *letter)
}

/// Decode raw string-literal text (without the surrounding quotes).
pub fn decode(raw: &str) -> Result<String, InvalidEscape> {
    let mut decoded = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();

    while let Some((offset, ch)) = chars.next() {
        if ch != '\\' {
            decoded.push(ch);
            continue;
        }
        match chars.next() {
            Some((_, letter)) => match unescaped(letter) {
                Some(original) => decoded.push(original),
                None => {
                    return Err(InvalidEscape {
                        offset,
                        found: Some(letter),
                    });
                }
            },
            None => {
                return Err(InvalidEscape {
                    offset,
                    found: None,
                });
            }
        }
    }

    Ok(decoded)
}

/// Encode a string value as raw literal text (without the surrounding quotes).
pub fn encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for ch in value.chars() {
        match escape_letter(ch) {
            Some(letter) => {
                encoded.push('\\');
                encoded.push(letter);
            }
            None => encoded.push(ch),
        }
    }
    encoded
}
