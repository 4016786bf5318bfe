//! # Marker Tokenizer
//!
//! Locates placeholder markers in parent markup. A marker is an attribute
//! (`data-pagelet` by default) whose value names a child fragment:
//!
//! ```text
//! <div data-pagelet='sidebar'>   <div data-pagelet="sidebar">   <div data-pagelet=sidebar>
//! ```
//!
//! The child's content belongs directly after the `>` closing the tag that
//! carries the marker. A marker with no later `>` is malformed and ignored.

pub const DEFAULT_MARKER_ATTRIBUTE: &str = "data-pagelet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Single,
    Double,
    None,
}

/// One marker attribute found in markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker<'a> {
    /// Byte offset of the attribute name.
    pub start: usize,
    /// Byte offset just past the attribute value (and closing quote).
    pub end: usize,
    pub value: &'a str,
    pub quote: Quote,
}

/// Iterator over every marker attribute in a piece of markup.
pub struct Markers<'a> {
    markup: &'a str,
    needle: String,
    cursor: usize,
}

pub fn markers<'a>(markup: &'a str, attribute: &str) -> Markers<'a> {
    Markers {
        markup,
        needle: format!("{attribute}="),
        cursor: 0,
    }
}

impl<'a> Iterator for Markers<'a> {
    type Item = Marker<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.markup.as_bytes();

        while self.cursor < self.markup.len() {
            let start = self.cursor + self.markup[self.cursor..].find(self.needle.as_str())?;
            self.cursor = start + self.needle.len();

            // `data-pagelet=` inside `xdata-pagelet=` is a different attribute.
            if start > 0 && !bytes[start - 1].is_ascii_whitespace() {
                continue;
            }

            if let Some(marker) = read_value(self.markup, start, self.cursor) {
                self.cursor = marker.end;
                return Some(marker);
            }
        }

        None
    }
}

fn read_value(markup: &str, start: usize, value_start: usize) -> Option<Marker<'_>> {
    let rest = &markup[value_start..];
    let quote = match rest.as_bytes().first() {
        Some(b'\'') => Quote::Single,
        Some(b'"') => Quote::Double,
        _ => Quote::None,
    };

    match quote {
        Quote::Single | Quote::Double => {
            let close = if quote == Quote::Single { '\'' } else { '"' };
            let len = rest[1..].find(close)?;
            Some(Marker {
                start,
                end: value_start + 1 + len + 1,
                value: &rest[1..1 + len],
                quote,
            })
        }
        Quote::None => {
            let len = unquoted_len(rest);
            if len == 0 {
                return None;
            }
            Some(Marker {
                start,
                end: value_start + len,
                value: &rest[..len],
                quote,
            })
        }
    }
}

fn unquoted_len(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut len = 0;
    while len < bytes.len() {
        match bytes[len] {
            b'>' => break,
            b'/' if bytes.get(len + 1) == Some(&b'>') => break,
            b if b.is_ascii_whitespace() => break,
            _ => len += 1,
        }
    }
    len
}

/// Offsets at which the content of child `name` must be inserted: just past
/// the first `>` following each marker that names it.
pub fn insertion_points(markup: &str, attribute: &str, name: &str) -> Vec<usize> {
    let mut points = Vec::new();

    for marker in markers(markup, attribute).filter(|m| m.value == name) {
        match markup[marker.end..].find('>') {
            Some(offset) => points.push(marker.end + offset + 1),
            None => tracing::debug!(
                child = name,
                at = marker.start,
                "Marker has no closing `>`, skipping"
            ),
        }
    }

    points
}
