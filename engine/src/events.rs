//! Append-only audit log of engine events.

use autosettle_common::EngineEvent;
use parking_lot::RwLock;
use tracing::info;

/// In-memory audit log. Settlement events are appended only after the
/// call that produced them has committed.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: RwLock<Vec<EngineEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event.
    pub fn append(&self, event: EngineEvent) {
        info!(event = event.name(), "Event recorded");
        self.entries.write().push(event);
    }

    /// Copy of every recorded event, oldest first.
    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.entries.read().clone()
    }

    /// Events recorded since index `start`.
    pub fn since(&self, start: usize) -> Vec<EngineEvent> {
        self.entries.read().iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Render the log as JSON lines.
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let entries = self.entries.read();
        let mut out = String::new();
        for event in entries.iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}
