use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

use super::events::{EngineEvent, EventSink};
use super::session::TypingSession;
use super::strategy::{Continuation, Injector, Step, StrategyKind};
use crate::input::{ClipboardAccess, PasteCommand};

/// External paste commands depend on OS focus, so the first character waits
/// longer than with native synthesis.
pub const CLIPBOARD_SETTLE_DELAY: Duration = Duration::from_millis(1500);
/// Clipboard updates are not guaranteed to be visible to other processes
/// immediately.
pub const CLIPBOARD_PROPAGATION_DELAY: Duration = Duration::from_millis(50);
pub const CLIPBOARD_RESTORE_DELAY: Duration = Duration::from_millis(1000);

/// Places one character at a time on the clipboard and triggers the
/// platform paste command. The user's clipboard is saved at session start
/// and written back when the session ends, however it ends.
pub struct ClipboardInjector<C, P> {
    clipboard: C,
    paste: Rc<P>,
}

impl<C, P> ClipboardInjector<C, P>
where
    C: ClipboardAccess,
    P: PasteCommand + 'static,
{
    pub fn new(clipboard: C, paste: P) -> Self {
        Self {
            clipboard,
            paste: Rc::new(paste),
        }
    }

    fn emit(&mut self, session: &mut TypingSession, events: &EventSink) -> Continuation {
        let Some(ch) = session.current() else {
            if session.looping() {
                session.rewind();
                return Continuation::After(session.delay() * 2, Step::Emit);
            }
            return Continuation::After(CLIPBOARD_RESTORE_DELAY, Step::Restore);
        };

        let position = session.cursor() + 1;
        if let Err(err) = self.clipboard.write_text(ch.encode_utf8(&mut [0; 4])) {
            warn!(position, "Failed to copy character to clipboard: {err:#}");
            session.advance();
            return Continuation::After(session.delay(), Step::Emit);
        }

        events.emit(EngineEvent::ClipboardProgress {
            character: ch,
            position,
            total: session.len(),
        });
        Continuation::After(CLIPBOARD_PROPAGATION_DELAY, Step::Paste)
    }

    fn paste(&self) -> Continuation {
        let paste = Rc::clone(&self.paste);
        Continuation::Defer(Box::pin(async move {
            Step::Pasted(paste.paste().await.map_err(|err| format!("{err:#}")))
        }))
    }

    fn restore(&mut self, session: &mut TypingSession, events: &EventSink) {
        let Some(original) = session.release_clipboard() else {
            return;
        };
        match self.clipboard.write_text(&original) {
            Ok(()) => {
                debug!(bytes = original.len(), "Original clipboard restored");
                events.emit(EngineEvent::ClipboardRestored);
            }
            Err(err) => warn!("Failed to restore original clipboard: {err:#}"),
        }
    }
}

impl<C, P> Injector for ClipboardInjector<C, P>
where
    C: ClipboardAccess,
    P: PasteCommand + 'static,
{
    fn kind(&self) -> StrategyKind {
        StrategyKind::ClipboardPaste
    }

    fn settle_delay(&self) -> Duration {
        CLIPBOARD_SETTLE_DELAY
    }

    fn begin(&mut self, session: &mut TypingSession) {
        let original = self.clipboard.read_text().unwrap_or_else(|err| {
            warn!("Could not read clipboard before typing: {err:#}");
            String::new()
        });
        session.hold_clipboard(original);
    }

    fn advance(
        &mut self,
        session: &mut TypingSession,
        step: Step,
        events: &EventSink,
    ) -> Continuation {
        match step {
            Step::Emit => self.emit(session, events),
            Step::Paste => self.paste(),
            Step::Pasted(result) => {
                if let Err(err) = result {
                    // A single lost character is not worth aborting the run.
                    warn!(position = session.cursor() + 1, "Failed to paste character: {err}");
                }
                session.advance();
                Continuation::After(session.delay(), Step::Emit)
            }
            Step::Restore => {
                self.restore(session, events);
                Continuation::Finish
            }
        }
    }

    fn release(&mut self, session: &mut TypingSession, events: &EventSink) {
        self.restore(session, events);
    }
}
