//! # Serializer / Join
//!
//! Flattens the queue into one output string: plain concatenation for
//! markup, a JSON document for structured responses.

use crate::content_type::ContentType;
use crate::error::JoinError;
use crate::fragment::Fragment;
use crate::queue::FragmentQueue;
use serde::Deserialize;

/// Shape of the JSON document of a structured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructuredLayout {
    /// An object keyed by fragment name, in queue order.
    #[default]
    Keyed,
    /// Only the first queued value, for single-child bootstraps.
    First,
}

/// Serialize and drain the queue. On error the queue is left as it was.
pub fn join(
    queue: &mut FragmentQueue,
    content_type: ContentType,
    layout: StructuredLayout,
) -> Result<String, JoinError> {
    let output = match content_type {
        ContentType::Markup => join_markup(queue.as_slice())?,
        ContentType::Structured => join_structured(queue.as_slice(), layout)?,
    };

    queue.drain();
    Ok(output)
}

fn join_markup(fragments: &[Fragment]) -> Result<String, JoinError> {
    let mut out = String::new();
    for fragment in fragments.iter().filter(|f| f.is_renderable()) {
        match fragment.payload().as_markup() {
            Some(markup) => out.push_str(markup),
            // Only reachable when a caller bypasses negotiation.
            None => out.push_str(&serde_json::to_string(&fragment.payload().to_json()?)?),
        }
    }
    Ok(out)
}

fn join_structured(fragments: &[Fragment], layout: StructuredLayout) -> Result<String, JoinError> {
    if fragments.is_empty() {
        return Ok(String::new());
    }

    let document = match layout {
        StructuredLayout::First => {
            let first = &fragments[0];
            if first.is_renderable() {
                first.payload().to_json()?
            } else {
                serde_json::Value::String(String::new())
            }
        }
        StructuredLayout::Keyed => {
            let mut map = serde_json::Map::new();
            for fragment in fragments.iter().filter(|f| f.is_renderable()) {
                map.insert(fragment.name().to_string(), fragment.payload().to_json()?);
            }
            serde_json::Value::Object(map)
        }
    };

    Ok(serde_json::to_string(&document)?)
}
