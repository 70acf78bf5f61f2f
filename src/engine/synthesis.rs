use std::time::Duration;
use tracing::{debug, error};

use super::events::EventSink;
use super::session::TypingSession;
use super::strategy::{Continuation, Injector, Step, StopReason, StrategyKind};
use crate::input::KeystrokeSynth;

pub const SYNTHESIS_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Types each character as a native keystroke.
pub struct SynthesisInjector<K> {
    synth: K,
}

impl<K: KeystrokeSynth> SynthesisInjector<K> {
    pub fn new(synth: K) -> Self {
        Self { synth }
    }
}

impl<K: KeystrokeSynth> Injector for SynthesisInjector<K> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Synthesis
    }

    fn settle_delay(&self) -> Duration {
        SYNTHESIS_SETTLE_DELAY
    }

    fn advance(
        &mut self,
        session: &mut TypingSession,
        _step: Step,
        _events: &EventSink,
    ) -> Continuation {
        let Some(ch) = session.current() else {
            if session.looping() {
                session.rewind();
                return Continuation::After(session.delay(), Step::Emit);
            }
            return Continuation::Finish;
        };

        if let Err(err) = self.synth.type_char(ch) {
            error!(
                position = session.cursor() + 1,
                "Error typing character: {err:#}"
            );
            return Continuation::Abort(StopReason::SynthesisFailed);
        }

        debug!(
            position = session.cursor() + 1,
            total = session.len(),
            "Typed character"
        );
        session.advance();
        Continuation::After(session.delay(), Step::Emit)
    }
}
