// File: figurine-common/src/models/telemetry.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured diagnostics record: an event name plus key/value fields.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Emitting component, e.g. `"controller"` or a joint name.
    pub source: String,
    pub name: String,
    pub fields: serde_json::Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            fields: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}
