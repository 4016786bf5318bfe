//! # Content-Type Negotiation
//!
//! A response starts out as markup. The first structured payload queued
//! regrades the whole response to JSON; there is no way back.

use crate::charset::{Charset, charset_param};
use crate::fragment::Payload;

pub const CONTENT_TYPE: &str = "Content-Type";

/// Negotiated output format of one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Markup,
    Structured,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Markup => "text/html",
            ContentType::Structured => "application/json",
        }
    }
}

/// The response-header collaborator.
pub trait HeaderSink {
    fn headers_sent(&self) -> bool;
    fn set_header(&mut self, name: &str, value: &str);
}

/// One-shot markup → structured state machine.
#[derive(Debug, Clone)]
pub struct Negotiator {
    state: ContentType,
    declared: Option<String>,
    default_charset: Charset,
}

impl Negotiator {
    pub fn new(default_charset: Charset) -> Self {
        Self {
            state: ContentType::Markup,
            declared: None,
            default_charset,
        }
    }

    /// Start from a known content-type header value, e.g.
    /// `text/html; charset=iso-8859-1`.
    pub fn with_declared(mut self, content_type: impl Into<String>) -> Self {
        self.declared = Some(content_type.into());
        self
    }

    pub fn state(&self) -> ContentType {
        self.state
    }

    pub fn declared(&self) -> Option<&str> {
        self.declared.as_deref()
    }

    /// Inspect an incoming payload. Returns `true` when this call performed
    /// the transition.
    pub fn observe(&mut self, payload: &Payload, headers: &mut dyn HeaderSink) -> bool {
        if self.state != ContentType::Markup || !payload.is_structured() {
            return false;
        }

        self.state = ContentType::Structured;
        let mime = self.state.mime();

        if headers.headers_sent() {
            tracing::debug!(
                content_type = mime,
                "Headers already sent, ignoring content type change"
            );
            return true;
        }

        tracing::debug!(content_type = mime, "Regrading response content type");
        headers.set_header(CONTENT_TYPE, mime);
        self.declared = Some(mime.to_string());
        true
    }

    /// Charset for encoding output: an explicit `charset` parameter on the
    /// declared content type wins over the default.
    pub fn charset(&self) -> Charset {
        self.declared
            .as_deref()
            .and_then(charset_param)
            .map(Charset::from_label_or_default)
            .unwrap_or(self.default_charset)
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new(Charset::default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct RecordingHeaders {
        pub sent: bool,
        pub set: Vec<(String, String)>,
    }

    impl HeaderSink for RecordingHeaders {
        fn headers_sent(&self) -> bool {
            self.sent
        }

        fn set_header(&mut self, name: &str, value: &str) {
            self.set.push((name.to_string(), value.to_string()));
        }
    }

    #[test]
    fn test_one_way_transition() {
        let mut headers = RecordingHeaders::default();
        let mut negotiator = Negotiator::default();

        assert!(!negotiator.observe(&Payload::from("<p>"), &mut headers));
        assert_eq!(negotiator.state(), ContentType::Markup);

        assert!(negotiator.observe(&serde_json::json!({ "a": 1 }).into(), &mut headers));
        assert_eq!(negotiator.state(), ContentType::Structured);

        assert!(!negotiator.observe(&Payload::from("<p>"), &mut headers));
        assert!(!negotiator.observe(&serde_json::json!([1]).into(), &mut headers));
        assert_eq!(negotiator.state(), ContentType::Structured);

        assert_eq!(
            headers.set,
            vec![(CONTENT_TYPE.to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn test_headers_already_sent() {
        let mut headers = RecordingHeaders {
            sent: true,
            ..Default::default()
        };
        let mut negotiator = Negotiator::default();

        assert!(negotiator.observe(&serde_json::json!({}).into(), &mut headers));
        assert_eq!(negotiator.state(), ContentType::Structured);
        assert!(headers.set.is_empty());
    }

    #[test]
    fn test_empty_payload_does_not_transition() {
        let mut headers = RecordingHeaders::default();
        let mut negotiator = Negotiator::default();

        assert!(!negotiator.observe(&Payload::Empty, &mut headers));
        assert_eq!(negotiator.state(), ContentType::Markup);
    }

    #[test]
    fn test_charset_resolution() {
        let negotiator = Negotiator::new(Charset::Utf8);
        assert_eq!(negotiator.charset(), Charset::Utf8);

        let negotiator = Negotiator::new(Charset::Utf8).with_declared("text/html; charset=latin1");
        assert_eq!(negotiator.charset(), Charset::Latin1);

        let mut headers = RecordingHeaders::default();
        let mut negotiator = negotiator;
        negotiator.observe(&serde_json::json!(1).into(), &mut headers);
        // The JSON header carries no charset parameter.
        assert_eq!(negotiator.charset(), Charset::Utf8);
    }
}
