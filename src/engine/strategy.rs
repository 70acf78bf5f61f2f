use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::events::EventSink;
use super::session::TypingSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Synthesis,
    ClipboardPaste,
}

impl StrategyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Synthesis => "keystroke synthesis",
            Self::ClipboardPaste => "clipboard paste",
        }
    }
}

/// A unit of work for the active injector. Each continuation posts exactly
/// one of these back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Emit,
    Paste,
    Pasted(Result<(), String>),
    Restore,
}

pub type Deferred = Pin<Box<dyn Future<Output = Step>>>;

/// What the engine should do after an injector step.
pub enum Continuation {
    After(Duration, Step),
    /// Run a future (an external command) and feed its result back as a step.
    Defer(Deferred),
    Finish,
    Abort(StopReason),
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::After(delay, step) => f.debug_tuple("After").field(delay).field(step).finish(),
            Self::Defer(_) => f.write_str("Defer(..)"),
            Self::Finish => f.write_str("Finish"),
            Self::Abort(reason) => f.debug_tuple("Abort").field(reason).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Requested,
    Panic,
    Interrupt,
    PointerMoved,
    SynthesisFailed,
    Shutdown,
}

impl StopReason {
    /// Interrupts bring the window back so the user sees why typing ended.
    pub fn raises_window(&self) -> bool {
        matches!(self, Self::Panic | Self::Interrupt | Self::PointerMoved)
    }
}

/// A mechanism for delivering the session's characters to the focused
/// application. The engine owns exactly one, chosen at startup.
pub trait Injector {
    fn kind(&self) -> StrategyKind;

    /// Wait between Start and the first character so the user can refocus
    /// the target application.
    fn settle_delay(&self) -> Duration;

    fn begin(&mut self, _session: &mut TypingSession) {}

    fn advance(
        &mut self,
        session: &mut TypingSession,
        step: Step,
        events: &EventSink,
    ) -> Continuation;

    /// Called once when the session leaves Typing for any reason.
    fn release(&mut self, _session: &mut TypingSession, _events: &EventSink) {}
}
