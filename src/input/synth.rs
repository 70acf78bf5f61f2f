use anyhow::{anyhow, Result};
use enigo::{Enigo, Keyboard, Mouse, Settings};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// Native keystroke synthesis.
pub trait KeystrokeSynth {
    fn type_char(&mut self, ch: char) -> Result<()>;
}

/// Reports the global pointer position in screen pixels.
pub trait PointerSource {
    fn location(&mut self) -> Result<(i32, i32)>;
}

/// One enigo connection shared by the synthesis injector and the pointer
/// monitor. Both live on the engine thread.
#[derive(Clone)]
pub struct EnigoBridge {
    enigo: Rc<RefCell<Enigo>>,
}

impl EnigoBridge {
    /// Returns `None` when the platform refuses a synthesis connection, in
    /// which case typing falls back to the clipboard.
    pub fn probe() -> Option<Self> {
        match Enigo::new(&Settings::default()) {
            Ok(enigo) => {
                debug!("Keystroke synthesis available");
                Some(Self {
                    enigo: Rc::new(RefCell::new(enigo)),
                })
            }
            Err(err) => {
                warn!("Keystroke synthesis unavailable: {err}");
                None
            }
        }
    }
}

impl KeystrokeSynth for EnigoBridge {
    fn type_char(&mut self, ch: char) -> Result<()> {
        let mut buf = [0; 4];
        self.enigo
            .borrow_mut()
            .text(ch.encode_utf8(&mut buf))
            .map_err(|err| anyhow!("Failed to type {ch:?}: {err}"))
    }
}

impl PointerSource for EnigoBridge {
    fn location(&mut self) -> Result<(i32, i32)> {
        self.enigo
            .borrow()
            .location()
            .map_err(|err| anyhow!("Failed to read pointer position: {err}"))
    }
}
