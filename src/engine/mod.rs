//! Typing automation engine.
//!
//! The engine is a single task that owns the [`TypingSession`] and processes
//! commands one at a time. Waiting never happens inline: every delay is a
//! local timer task that posts a [`Step`] back into the command queue tagged
//! with its session id, and the engine drops steps whose session is no longer
//! the typing one. `Stop` aborts the outstanding timers, so at most one
//! already-queued step can arrive late and it is discarded.

mod clipboard;
mod events;
mod monitor;
mod session;
mod strategy;
mod synthesis;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::future::Future;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::input::{HotkeyAction, HotkeyRegistry, PointerSource};
use crate::settings::Settings;

pub use clipboard::{
    ClipboardInjector, CLIPBOARD_PROPAGATION_DELAY, CLIPBOARD_RESTORE_DELAY,
    CLIPBOARD_SETTLE_DELAY,
};
pub use events::{EngineEvent, EventSink};
pub use monitor::{
    InterruptMonitor, MonitorMode, PointerTracker, CLIPBOARD_INTERRUPT_KEYS, PANIC_HOTKEY,
    POINTER_POLL_INTERVAL, POINTER_THRESHOLD,
};
pub use session::{TypingSession, TypingState};
pub use strategy::{Continuation, Deferred, Injector, Step, StopReason, StrategyKind};
pub use synthesis::{SynthesisInjector, SYNTHESIS_SETTLE_DELAY};

const EVENT_CAPACITY: usize = 256;

pub(crate) enum EngineCommand {
    Start,
    Stop,
    Toggle,
    Hotkey(u32),
    Rebind {
        accelerator: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Continue {
        session: u64,
        step: Step,
    },
    PointerTick {
        session: u64,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub state: TypingState,
    pub strategy: StrategyKind,
    pub cursor: Option<usize>,
    pub length: Option<usize>,
    pub pending_timers: usize,
    pub interrupt_handles: usize,
}

/// Everything the engine needs from the platform.
pub struct EngineParts {
    pub injector: Box<dyn Injector>,
    pub hotkeys: HotkeyRegistry,
    pub pointer: Option<Box<dyn PointerSource>>,
}

/// Cloneable, `Send` front door to a running [`TypingEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    status: watch::Receiver<TypingState>,
    events: EventSink,
}

impl EngineHandle {
    pub fn start(&self) -> bool {
        self.send(EngineCommand::Start)
    }

    pub fn stop(&self) -> bool {
        self.send(EngineCommand::Stop)
    }

    pub fn toggle(&self) -> bool {
        self.send(EngineCommand::Toggle)
    }

    /// Forwards a pressed global hotkey. Returns false once the engine is gone.
    pub fn hotkey(&self, id: u32) -> bool {
        self.send(EngineCommand::Hotkey(id))
    }

    pub fn shutdown(&self) {
        self.send(EngineCommand::Shutdown);
    }

    pub fn status(&self) -> TypingState {
        *self.status.borrow()
    }

    /// Resolves on the next state transition.
    pub async fn status_changed(&mut self) -> Result<TypingState> {
        self.status
            .changed()
            .await
            .map_err(|_| anyhow!("Typing engine stopped"))?;
        Ok(*self.status.borrow_and_update())
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(EngineCommand::Snapshot(reply)) {
            return Err(anyhow!("Typing engine stopped"));
        }
        rx.await.map_err(|_| anyhow!("Typing engine stopped"))
    }

    /// Replaces the start/stop hotkey.
    pub async fn rebind(&self, accelerator: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let command = EngineCommand::Rebind {
            accelerator: accelerator.to_string(),
            reply,
        };
        if !self.send(command) {
            return Err(anyhow!("Typing engine stopped"));
        }
        rx.await.map_err(|_| anyhow!("Typing engine stopped"))?
    }

    fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

#[derive(Default)]
struct TimerSet {
    handles: Vec<JoinHandle<()>>,
}

impl TimerSet {
    fn track(&mut self, handle: JoinHandle<()>) {
        self.handles.retain(|handle| !handle.is_finished());
        self.handles.push(handle);
    }

    fn cancel_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    fn pending(&self) -> usize {
        self.handles
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

pub struct TypingEngine {
    injector: Box<dyn Injector>,
    hotkeys: HotkeyRegistry,
    monitor: InterruptMonitor,
    settings: watch::Receiver<Settings>,
    session: Option<TypingSession>,
    timers: TimerSet,
    next_session: u64,
    events: EventSink,
    status: watch::Sender<TypingState>,
    commands: mpsc::UnboundedSender<EngineCommand>,
    inbox: mpsc::UnboundedReceiver<EngineCommand>,
}

impl TypingEngine {
    pub fn new(parts: EngineParts, settings: watch::Receiver<Settings>) -> (Self, EngineHandle) {
        let EngineParts {
            injector,
            hotkeys,
            pointer,
        } = parts;
        let (commands, inbox) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(TypingState::Idle);
        let events = EventSink::new(EVENT_CAPACITY);
        let monitor = InterruptMonitor::new(injector.kind().into(), pointer);

        let handle = EngineHandle {
            commands: commands.clone(),
            status: status_rx,
            events: events.clone(),
        };

        let engine = Self {
            injector,
            hotkeys,
            monitor,
            settings,
            session: None,
            timers: TimerSet::default(),
            next_session: 0,
            events,
            status,
            commands,
            inbox,
        };

        (engine, handle)
    }

    /// Runs until [`EngineHandle::shutdown`]. Must be polled inside a
    /// `tokio::task::LocalSet`.
    pub async fn run(mut self) {
        let hotkey = self.settings.borrow().hotkey.clone();
        match self.hotkeys.bind_primary(&hotkey) {
            Ok(()) => info!("Start/stop hotkey active: {hotkey}"),
            Err(err) => warn!("Failed to register start/stop hotkey {hotkey}: {err:#}"),
        }
        info!(
            "⌨️  Typing engine ready ({})",
            self.injector.kind().label()
        );

        while let Some(command) = self.inbox.recv().await {
            if matches!(command, EngineCommand::Shutdown) {
                break;
            }
            self.handle(command);
        }

        self.stop(StopReason::Shutdown);
        self.hotkeys.release_all();
        debug!("Typing engine stopped");
    }

    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Start => self.start(),
            EngineCommand::Stop => {
                self.stop(StopReason::Requested);
            }
            EngineCommand::Toggle => self.toggle(),
            EngineCommand::Hotkey(id) => self.on_hotkey(id),
            EngineCommand::Rebind { accelerator, reply } => {
                let result = self.hotkeys.bind_primary(&accelerator);
                match &result {
                    Ok(()) => info!("Start/stop hotkey active: {accelerator}"),
                    Err(err) => warn!("Failed to register start/stop hotkey: {err:#}"),
                }
                let _ = reply.send(result);
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::Continue { session, step } => self.resume(session, step),
            EngineCommand::PointerTick { session } => self.on_pointer_tick(session),
            EngineCommand::Shutdown => {
                self.stop(StopReason::Shutdown);
            }
        }
    }

    fn state(&self) -> TypingState {
        if self.session.is_some() {
            TypingState::Typing
        } else {
            TypingState::Idle
        }
    }

    fn is_current(&self, session: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == session)
    }

    fn toggle(&mut self) {
        if self.state().is_typing() {
            info!("Stopping typing...");
            self.stop(StopReason::Requested);
        } else {
            info!("Starting typing...");
            self.start();
        }
    }

    fn start(&mut self) {
        if self.session.is_some() {
            debug!("Start ignored; already typing");
            return;
        }

        let (text, delay, looping) = {
            let settings = self.settings.borrow();
            (settings.text.clone(), settings.delay, settings.loop_typing)
        };
        if text.trim().is_empty() {
            debug!("Start ignored; nothing to type");
            return;
        }

        self.next_session += 1;
        let id = self.next_session;
        let mut session = TypingSession::new(id, &text, delay, looping);
        self.injector.begin(&mut session);
        info!(
            characters = session.len(),
            delay_ms = delay,
            looping,
            "🚀 Typing started via {}",
            self.injector.kind().label()
        );
        self.session = Some(session);

        self.status.send_replace(TypingState::Typing);
        self.monitor.arm(&mut self.hotkeys, id, &self.commands);
        self.events
            .emit(EngineEvent::TypingStatusChanged { typing: true });
        self.events.emit(EngineEvent::HideWindow);

        let settle = self.injector.settle_delay();
        self.schedule(id, Continuation::After(settle, Step::Emit));
    }

    /// Returns whether a session was actually stopped.
    fn stop(&mut self, reason: StopReason) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };

        self.timers.cancel_all();
        self.monitor.disarm(&mut self.hotkeys);
        self.injector.release(&mut session, &self.events);

        self.status.send_replace(TypingState::Idle);
        self.events
            .emit(EngineEvent::TypingStatusChanged { typing: false });
        if reason.raises_window() {
            self.events.emit(EngineEvent::ShowWindow);
        }

        info!(
            ?reason,
            typed = session.cursor(),
            total = session.len(),
            "🛑 Typing stopped"
        );
        true
    }

    fn resume(&mut self, session_id: u64, step: Step) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.id() == session_id)
        else {
            debug!(session = session_id, "Dropping stale continuation");
            return;
        };

        let next = self.injector.advance(session, step, &self.events);
        self.schedule(session_id, next);
    }

    fn schedule(&mut self, session: u64, next: Continuation) {
        match next {
            Continuation::After(delay, step) => self.spawn_continuation(session, async move {
                tokio::time::sleep(delay).await;
                step
            }),
            Continuation::Defer(work) => self.spawn_continuation(session, work),
            Continuation::Finish => {
                self.stop(StopReason::Completed);
            }
            Continuation::Abort(reason) => {
                self.stop(reason);
            }
        }
    }

    fn spawn_continuation(&mut self, session: u64, work: impl Future<Output = Step> + 'static) {
        let commands = self.commands.clone();
        let handle = tokio::task::spawn_local(async move {
            let step = work.await;
            let _ = commands.send(EngineCommand::Continue { session, step });
        });
        self.timers.track(handle);
    }

    fn on_hotkey(&mut self, id: u32) {
        let Some(action) = self.hotkeys.action_for(id) else {
            debug!(id, "Ignoring unregistered hotkey");
            return;
        };

        match action {
            HotkeyAction::Toggle => self.toggle(),
            HotkeyAction::Panic => {
                if self.state().is_typing() {
                    info!("{PANIC_HOTKEY} pressed during typing, stopping...");
                    self.stop(StopReason::Panic);
                }
            }
            HotkeyAction::Interrupt => {
                if self.state().is_typing() {
                    let name = self.hotkeys.describe(id).unwrap_or("interrupt key");
                    info!("Interrupt key {name} pressed during clipboard typing, stopping...");
                    self.stop(StopReason::Interrupt);
                }
            }
        }
    }

    fn on_pointer_tick(&mut self, session: u64) {
        if !self.is_current(session) {
            return;
        }
        if self.monitor.sample_pointer() {
            info!("Mouse movement detected during typing, stopping...");
            self.stop(StopReason::PointerMoved);
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state(),
            strategy: self.injector.kind(),
            cursor: self.session.as_ref().map(TypingSession::cursor),
            length: self.session.as_ref().map(TypingSession::len),
            pending_timers: self.timers.pending(),
            interrupt_handles: self.monitor.armed_count(),
        }
    }
}
