use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Notifications for the presentation surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EngineEvent {
    TypingStatusChanged {
        typing: bool,
    },
    /// Clipboard mode only. `position` is 1-based.
    ClipboardProgress {
        character: char,
        position: usize,
        total: usize,
    },
    ClipboardRestored,
    HideWindow,
    ShowWindow,
}

/// Broadcasts engine events to every watcher; events nobody is subscribed
/// to are dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        trace!(?event, "engine event");
        // No subscribers is normal when nothing is watching.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}
