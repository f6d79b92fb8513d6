//! Equality filters over top-level document fields

use serde_json::Value;

/// Conjunction of `field == value` conditions; empty matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition
    pub fn field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Add a condition only when `value` is present
    pub fn field_opt<V: Into<Value>>(self, field: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.field(field, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}
