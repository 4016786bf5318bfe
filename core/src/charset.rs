//! Character encodings the flush path can emit.

use bytes::Bytes;
use std::fmt;

pub const DEFAULT_CHARSET: Charset = Charset::Utf8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Ascii,
    Utf16Le,
}

impl Charset {
    /// Look up a charset by its label, ignoring ASCII case.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "latin1" | "binary" => Some(Charset::Latin1),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            "utf-16le" | "utf16le" | "ucs2" | "ucs-2" => Some(Charset::Utf16Le),
            _ => None,
        }
    }

    /// Like [`Charset::from_label`], falling back to UTF-8.
    pub fn from_label_or_default(label: &str) -> Self {
        Self::from_label(label).unwrap_or_else(|| {
            tracing::warn!(label, "Unknown charset, falling back to {}", DEFAULT_CHARSET);
            DEFAULT_CHARSET
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Latin1 => "iso-8859-1",
            Charset::Ascii => "us-ascii",
            Charset::Utf16Le => "utf-16le",
        }
    }

    /// Encode text. Characters a single-byte charset cannot hold become `?`.
    pub fn encode(self, text: &str) -> Bytes {
        match self {
            Charset::Utf8 => Bytes::copy_from_slice(text.as_bytes()),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect::<Vec<_>>()
                .into(),
            Charset::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect::<Vec<_>>()
                .into(),
            Charset::Utf16Le => text
                .encode_utf16()
                .flat_map(u16::to_le_bytes)
                .collect::<Vec<_>>()
                .into(),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extract the `charset` parameter of a content-type header value.
pub fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}
