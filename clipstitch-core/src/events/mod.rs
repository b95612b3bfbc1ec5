//! Run progress events.
//!
//! The orchestrator describes a run as a finite sequence of `RunEvent`s.
//! Consumers either pull them from `RunEvents` or register an
//! `EventHandler`; the core never renders anything itself.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::assembly::AssemblyStrategy;
use crate::pipeline::RunReport;
use crate::segment::MaterializeStage;

pub mod json_handler;
pub mod log_handler;

pub use json_handler::JsonEventHandler;
pub use log_handler::LogEventHandler;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        total_items: usize,
        workers: usize,
        transitions: bool,
        overlay: bool,
        work_dir: PathBuf,
    },

    // Per-item events; `index` is the 0-based input position
    ItemStarted {
        index: usize,
        total_items: usize,
        raw: String,
    },
    FetchRetry {
        index: usize,
        source_id: String,
        attempt: u32,
        max_attempts: u32,
        delay_secs: f64,
        reason: String,
    },
    ItemSucceeded {
        index: usize,
        sequence: usize,
        source_id: String,
        path: PathBuf,
        labeled: bool,
    },
    ItemFailed {
        index: usize,
        raw: String,
        stage: Option<MaterializeStage>,
        reason: String,
    },
    /// A segment made with the accelerated encoder was redone in software
    /// after that encoder was switched off
    SegmentReencoded {
        index: usize,
        sequence: usize,
        encoder: String,
    },
    /// `index` is `None` when overlay is off for the whole run
    OverlaySkipped {
        index: Option<usize>,
        reason: String,
    },

    // Assembly
    AssemblyStarted {
        clip_count: usize,
        blended: bool,
    },
    BlendFallback {
        reason: String,
    },
    AssemblyFinished {
        output: PathBuf,
        strategy: AssemblyStrategy,
        size_bytes: u64,
    },
    AssemblyFailed {
        reason: String,
    },

    CleanupWarning {
        message: String,
    },
    RunFinished {
        report: RunReport,
    },
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &RunEvent);
}

pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn emit(&self, event: &RunEvent) {
        for handler in &self.handlers {
            handler.handle(event);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for EventDispatcher {
    fn handle(&self, event: &RunEvent) {
        self.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RunEvent>>);

    impl EventHandler for Recorder {
        fn handle(&self, event: &RunEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn dispatcher_fans_out_to_every_handler() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut dispatcher = EventDispatcher::new();
        assert!(dispatcher.is_empty());
        dispatcher.add_handler(first.clone());
        dispatcher.add_handler(second.clone());

        dispatcher.emit(&RunEvent::BlendFallback {
            reason: "graph failed".into(),
        });
        assert_eq!(first.0.lock().unwrap().len(), 1);
        assert_eq!(second.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = RunEvent::ItemFailed {
            index: 1,
            raw: "not a url".into(),
            stage: None,
            reason: "unsupported host".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "item_failed");
        assert_eq!(value["index"], 1);
        assert!(value["stage"].is_null());
    }
}
