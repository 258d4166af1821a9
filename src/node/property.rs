//! Typed node properties and the flow context they resolve against.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;

use super::message::NodeMessage;

/// Where a configured property takes its value from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// A (dotted) path into the inbound message.
    Msg,
    /// A key in the flow-scoped context.
    Flow,
    /// A key in the global context.
    Global,
    /// An environment variable name.
    Env,
    /// A literal string.
    #[default]
    Str,
    /// A JSON literal.
    Json,
    /// A numeric literal.
    Num,
    /// A boolean literal (`"true"` is true, anything else false).
    Bool,
    /// Any kind the node does not understand; resolves to nothing.
    #[serde(other)]
    Unknown,
}

/// Shared key/value stores the host exposes to nodes.
pub trait FlowContext: Send + Sync {
    /// Value stored in the flow scope.
    fn flow(&self, key: &str) -> Option<Value>;

    /// Value stored in the global scope.
    fn global(&self, key: &str) -> Option<Value>;
}

/// In-memory [`FlowContext`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFlowContext {
    flow: HashMap<String, Value>,
    global: HashMap<String, Value>,
}

impl MemoryFlowContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flow-scoped value.
    pub fn with_flow(mut self, key: impl Into<String>, value: Value) -> Self {
        self.flow.insert(key.into(), value);
        self
    }

    /// Adds a global value.
    pub fn with_global(mut self, key: impl Into<String>, value: Value) -> Self {
        self.global.insert(key.into(), value);
        self
    }
}

impl FlowContext for MemoryFlowContext {
    fn flow(&self, key: &str) -> Option<Value> {
        self.flow.get(key).cloned()
    }

    fn global(&self, key: &str) -> Option<Value> {
        self.global.get(key).cloned()
    }
}

/// A configured value together with its [`PropertyType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedProperty {
    /// Raw configured value.
    pub value: String,
    /// How `value` is interpreted.
    pub kind: PropertyType,
}

impl TypedProperty {
    /// Creates a property.
    pub fn new(value: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    /// Resolves the property for one message.
    pub fn resolve(&self, msg: &NodeMessage, context: &dyn FlowContext) -> Option<Value> {
        let raw = self.value.as_str();
        match self.kind {
            PropertyType::Msg => msg.get_path(raw).cloned(),
            PropertyType::Flow => context.flow(raw),
            PropertyType::Global => context.global(raw),
            PropertyType::Env => std::env::var(raw).ok().map(Value::String),
            PropertyType::Str => Some(Value::String(raw.to_string())),
            PropertyType::Json => Some(
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
            ),
            PropertyType::Num => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            PropertyType::Bool => Some(Value::Bool(raw == "true")),
            PropertyType::Unknown => None,
        }
    }
}
