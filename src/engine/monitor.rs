use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use super::strategy::StrategyKind;
use super::EngineCommand;
use crate::input::{HotkeyAction, HotkeyRegistry, PointerSource};

pub const PANIC_HOTKEY: &str = "Escape";
pub const POINTER_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Displacement in pixels, on either axis, that counts as user activity.
pub const POINTER_THRESHOLD: u32 = 30;

/// Shortcuts a user is likely to reach for while text is being pasted. The
/// paste shortcut itself is absent because the injector needs it.
pub const CLIPBOARD_INTERRUPT_KEYS: &[&str] = &[
    "CmdOrCtrl+C",
    "CmdOrCtrl+X",
    "CmdOrCtrl+Z",
    "CmdOrCtrl+A",
    "CmdOrCtrl+S",
    "CmdOrCtrl+N",
    "CmdOrCtrl+O",
    "CmdOrCtrl+W",
    "CmdOrCtrl+Tab",
    "Alt+Tab",
    "Cmd+Tab",
    "F1",
    "F2",
    "F3",
    "F4",
    "F5",
    "F6",
    "F7",
    "F8",
    "F9",
    "F10",
    "F11",
    "F12",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Synthesis,
    Clipboard,
}

impl From<StrategyKind> for MonitorMode {
    fn from(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Synthesis => Self::Synthesis,
            StrategyKind::ClipboardPaste => Self::Clipboard,
        }
    }
}

/// Compares consecutive pointer samples. The first sample after a reset is
/// only a baseline.
#[derive(Debug, Default)]
pub struct PointerTracker {
    last: Option<(i32, i32)>,
}

impl PointerTracker {
    pub fn observe(&mut self, position: (i32, i32)) -> bool {
        match self.last.replace(position) {
            None => false,
            Some((x0, y0)) => {
                position.0.abs_diff(x0) > POINTER_THRESHOLD
                    || position.1.abs_diff(y0) > POINTER_THRESHOLD
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Cancellation triggers that are live only while a session is typing.
pub struct InterruptMonitor {
    mode: MonitorMode,
    pointer: Option<Box<dyn PointerSource>>,
    tracker: PointerTracker,
    armed: Vec<u32>,
    poller: Option<JoinHandle<()>>,
}

impl InterruptMonitor {
    pub fn new(mode: MonitorMode, pointer: Option<Box<dyn PointerSource>>) -> Self {
        Self {
            mode,
            pointer,
            tracker: PointerTracker::default(),
            armed: Vec::new(),
            poller: None,
        }
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len() + usize::from(self.poller.is_some())
    }

    /// Must run inside a `LocalSet`; the pointer poller is a local task.
    pub(crate) fn arm(
        &mut self,
        hotkeys: &mut HotkeyRegistry,
        session: u64,
        commands: &mpsc::UnboundedSender<EngineCommand>,
    ) {
        self.disarm_triggers(hotkeys);

        match hotkeys.bind(PANIC_HOTKEY, HotkeyAction::Panic) {
            Ok(id) => self.armed.push(id),
            Err(err) => error!("Failed to register {PANIC_HOTKEY} key: {err:#}"),
        }

        match self.mode {
            MonitorMode::Synthesis => {
                if self.pointer.is_some() {
                    self.tracker.reset();
                    self.poller = Some(spawn_pointer_poller(session, commands.clone()));
                }
            }
            MonitorMode::Clipboard => {
                for key in CLIPBOARD_INTERRUPT_KEYS {
                    match hotkeys.bind(key, HotkeyAction::Interrupt) {
                        Ok(id) => self.armed.push(id),
                        Err(err) => {
                            info!("Could not register {key} - may already be in use");
                            debug!("{key}: {err:#}");
                        }
                    }
                }
            }
        }

        debug!(
            mode = ?self.mode,
            hotkeys = self.armed.len(),
            pointer = self.poller.is_some(),
            "Interrupt monitor armed"
        );
    }

    /// Samples the pointer. Returns true when the movement since the
    /// previous sample looks like the user taking over.
    pub fn sample_pointer(&mut self) -> bool {
        let Some(pointer) = self.pointer.as_mut() else {
            return false;
        };
        match pointer.location() {
            Ok(position) => self.tracker.observe(position),
            Err(err) => {
                trace!("Pointer sample failed: {err:#}");
                false
            }
        }
    }

    pub fn disarm(&mut self, hotkeys: &mut HotkeyRegistry) {
        self.disarm_triggers(hotkeys);
        if self.mode == MonitorMode::Clipboard {
            hotkeys.reestablish_primary();
        }
    }

    fn disarm_triggers(&mut self, hotkeys: &mut HotkeyRegistry) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        for id in self.armed.drain(..) {
            hotkeys.release(id);
        }
        self.tracker.reset();
    }
}

fn spawn_pointer_poller(
    session: u64,
    commands: mpsc::UnboundedSender<EngineCommand>,
) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        let mut ticker = tokio::time::interval(POINTER_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if commands
                .send(EngineCommand::PointerTick { session })
                .is_err()
            {
                break;
            }
        }
    })
}
