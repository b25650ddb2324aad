use std::fmt;

/// Numeric album identifier pulled out of free-form chat text.
///
/// No validation beyond "contains digits": the downloader is the authority on
/// whether an album with this id exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AlbumId(String);

impl AlbumId {
    /// Keep every decimal digit of `text`, in order, as ASCII. Full-width
    /// digits from CJK input methods count too. `None` when there are none.
    pub fn extract(text: &str) -> Option<Self> {
        let digits: String = text.chars().filter_map(ascii_digit).collect();
        if digits.is_empty() {
            None
        } else {
            Some(Self(digits))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn ascii_digit(c: char) -> Option<char> {
    match c {
        '0'..='9' => Some(c),
        '\u{FF10}'..='\u{FF19}' => char::from_digit(c as u32 - 0xFF10, 10),
        _ => None,
    }
}

impl fmt::Display for AlbumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
