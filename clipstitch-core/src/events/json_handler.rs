//! JSON progress handler for structured progress output
//!
//! Writes one JSON object per event, each tagged with its `type` and a
//! Unix timestamp, for consumption by other tools.

use super::{EventHandler, RunEvent};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Event handler that outputs run events as JSON lines
pub struct JsonEventHandler {
    output: Mutex<Box<dyn Write + Send>>,
}

impl Default for JsonEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonEventHandler {
    /// Create a handler that writes to stdout
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Box::new(io::stdout())),
        }
    }

    /// Create a handler with a custom writer
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            output: Mutex::new(writer),
        }
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// JSON object for `event`, with a timestamp field added.
    pub fn to_json(event: &RunEvent) -> serde_json::Value {
        let mut value = serde_json::to_value(event).unwrap_or_else(|e| {
            serde_json::json!({ "type": "serialization_error", "message": e.to_string() })
        });
        if let Some(object) = value.as_object_mut() {
            object.insert("timestamp".to_string(), Self::get_timestamp().into());
        }
        value
    }
}

impl EventHandler for JsonEventHandler {
    fn handle(&self, event: &RunEvent) {
        let value = Self::to_json(event);
        if let Ok(mut output) = self.output.lock() {
            if let Ok(json_str) = serde_json::to_string(&value) {
                let _ = writeln!(output, "{json_str}");
                let _ = output.flush();
            }
        }
    }
}
