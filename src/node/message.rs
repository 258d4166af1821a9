//! Flow messages exchanged with the host.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message travelling through a flow.
///
/// Messages are arbitrary JSON objects. The node reads its parameters from
/// well-known fields and writes the operation result to `payload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeMessage(Map<String, Value>);

impl NodeMessage {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a dotted path such as `payload.file.id`. Numeric segments
    /// index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets a top-level field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// The `payload` field.
    pub fn payload(&self) -> Option<&Value> {
        self.0.get("payload")
    }

    /// Replaces the `payload` field.
    pub fn set_payload(&mut self, payload: Value) {
        self.set("payload", payload);
    }

    /// Borrows the underlying object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the message into its underlying object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for NodeMessage {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Host truthiness: `null`, `false`, `0` and `""` are absent.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders a parameter value as text. Falsy values yield `None`.
pub fn value_to_string(value: &Value) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

/// Renders a content value as bytes.
///
/// Buffers serialized by the host (`{"type": "Buffer", "data": [..]}`) are
/// decoded to their raw bytes; objects and arrays become their JSON text.
pub fn value_to_bytes(value: &Value) -> Option<Bytes> {
    if let Some(buffer) = buffer_bytes(value) {
        return Some(buffer);
    }
    value_to_string(value).map(Bytes::from)
}

fn buffer_bytes(value: &Value) -> Option<Bytes> {
    let object = value.as_object()?;
    if object.get("type")?.as_str()? != "Buffer" {
        return None;
    }

    object
        .get("data")?
        .as_array()?
        .iter()
        .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()
        .map(Bytes::from)
}
