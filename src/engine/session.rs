use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingState {
    #[default]
    Idle,
    Typing,
}

impl TypingState {
    pub fn is_typing(self) -> bool {
        matches!(self, Self::Typing)
    }
}

/// One run of the typing automation. The buffer is a snapshot of the stored
/// text taken at start and never changes afterwards.
#[derive(Debug)]
pub struct TypingSession {
    id: u64,
    buffer: Vec<char>,
    cursor: usize,
    delay: Duration,
    looping: bool,
    saved_clipboard: Option<String>,
}

impl TypingSession {
    pub fn new(id: u64, text: &str, delay_ms: u64, looping: bool) -> Self {
        Self {
            id,
            buffer: text.chars().collect(),
            cursor: 0,
            delay: Duration::from_millis(delay_ms),
            looping,
            saved_clipboard: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Character under the cursor, `None` once the end of the buffer is reached.
    pub fn current(&self) -> Option<char> {
        self.buffer.get(self.cursor).copied()
    }

    pub fn advance(&mut self) {
        if self.cursor < self.buffer.len() {
            self.cursor += 1;
        }
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn saved_clipboard(&self) -> Option<&str> {
        self.saved_clipboard.as_deref()
    }

    pub fn hold_clipboard(&mut self, original: String) {
        self.saved_clipboard = Some(original);
    }

    pub fn release_clipboard(&mut self) -> Option<String> {
        self.saved_clipboard.take()
    }
}
