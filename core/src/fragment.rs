//! # Fragment: the unit of queued output
//!
//! A fragment is the output of one named component together with the name of
//! the component whose markup carries its marker. Fragments are immutable to
//! producers once queued; only the reducer rewrites their payload.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A structured (non-markup) payload.
///
/// Anything `Serialize` qualifies. Conversion is fallible so that values which
/// refuse to serialize (for instance cyclic graphs with a guarding `Serialize`
/// impl) surface as a join error instead of a panic.
pub trait StructuredValue: fmt::Debug + Send + Sync {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;
}

impl<T> StructuredValue for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Payload of a fragment.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No output at all.
    #[default]
    Empty,
    /// Rendered markup.
    Markup(String),
    /// A value that turns the whole response into JSON.
    Structured(Arc<dyn StructuredValue>),
}

impl Payload {
    pub fn markup(text: impl Into<String>) -> Self {
        Payload::Markup(text.into())
    }

    pub fn structured<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Payload::Structured(Arc::new(value))
    }

    /// True for non-string payloads; these trigger content-type negotiation.
    pub fn is_structured(&self) -> bool {
        matches!(self, Payload::Structured(_))
    }

    /// Empty and zero-length markup payloads contribute nothing to the output.
    pub fn is_falsy(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Markup(text) => text.is_empty(),
            Payload::Structured(_) => false,
        }
    }

    pub fn as_markup(&self) -> Option<&str> {
        match self {
            Payload::Markup(text) => Some(text),
            _ => None,
        }
    }

    /// JSON form used by the structured serializer. Markup becomes a string.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Payload::Empty => Ok(serde_json::Value::String(String::new())),
            Payload::Markup(text) => Ok(serde_json::Value::String(text.clone())),
            Payload::Structured(value) => value.to_json(),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Markup(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Markup(text)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Structured(Arc::new(value))
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// One named unit of output.
#[derive(Debug, Clone)]
pub struct Fragment {
    name: String,
    parent: Option<String>,
    payload: Payload,
}

impl Fragment {
    pub fn new(name: impl Into<String>, parent: Option<String>, payload: impl Into<Payload>) -> Self {
        // An empty parent name means "no parent".
        let parent = parent.filter(|p| !p.is_empty());
        Self {
            name: name.into(),
            parent,
            payload: payload.into(),
        }
    }

    /// A fragment with no parent.
    pub fn root(name: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self::new(name, None, payload)
    }

    pub fn child(
        name: impl Into<String>,
        parent: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Self {
        Self::new(name, Some(parent.into()), payload)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Whether the serializer includes this fragment.
    pub fn is_renderable(&self) -> bool {
        !self.name.is_empty() && !self.payload.is_falsy()
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>, Payload) {
        (self.name, self.parent, self.payload)
    }
}
