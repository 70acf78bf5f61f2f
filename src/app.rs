use anyhow::{bail, Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(windows)]
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
};

use crate::cli::StrategyChoice;
use crate::engine::{
    ClipboardInjector, EngineHandle, EngineParts, StrategyKind, SynthesisInjector, TypingEngine,
};
use crate::input::{
    EnigoBridge, GlobalHotkeyRegistrar, HotkeyRegistry, SystemClipboard, SystemPaste,
};
use crate::settings::SettingsStore;
use crate::status::StatusWriter;
use crate::update::UpdateChecker;

const HOTKEY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Picks the injection strategy. `Auto` prefers native synthesis and falls
/// back to the clipboard when the platform refuses it.
pub fn select_strategy(choice: StrategyChoice, synthesis_available: bool) -> Result<StrategyKind> {
    match choice {
        StrategyChoice::Auto if synthesis_available => Ok(StrategyKind::Synthesis),
        StrategyChoice::Auto => Ok(StrategyKind::ClipboardPaste),
        StrategyChoice::Synthesis if synthesis_available => Ok(StrategyKind::Synthesis),
        StrategyChoice::Synthesis => bail!("Keystroke synthesis is not available on this system"),
        StrategyChoice::Clipboard => Ok(StrategyKind::ClipboardPaste),
    }
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub strategy: StrategyChoice,
    pub control_socket: PathBuf,
    pub update_check: bool,
}

pub struct KeysmashApp {
    settings: SettingsStore,
    options: AppOptions,
}

impl KeysmashApp {
    pub fn new(settings: SettingsStore, options: AppOptions) -> Self {
        Self { settings, options }
    }

    /// Runs until `shutdown` resolves. Must be polled inside a
    /// `tokio::task::LocalSet`.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let parts = self.build_parts()?;
        let strategy = parts.injector.kind();
        let (engine, handle) = TypingEngine::new(parts, self.settings.subscribe());
        let engine_task = tokio::task::spawn_local(engine.run());

        let hotkey_task = spawn_hotkey_pump(handle.clone());
        let status_writer = match StatusWriter::new(strategy) {
            Ok(writer) => Some(writer),
            Err(err) => {
                warn!("Status file disabled: {err:#}");
                None
            }
        };
        let status_task = spawn_status_writer(handle.clone(), status_writer);

        let updates = if self.options.update_check && self.settings.get().check_for_updates {
            match UpdateChecker::new() {
                Ok(checker) => Some(checker),
                Err(err) => {
                    warn!("Update checks disabled: {err:#}");
                    None
                }
            }
        } else {
            info!("Update checks disabled");
            None
        };
        let update_task = updates.clone().map(UpdateChecker::spawn_periodic);

        let control_task = self.spawn_control(handle.clone(), updates);

        info!("🚀 keysmash-rs running!");
        shutdown.await;

        info!("🛑 Shutting down keysmash-rs...");
        handle.shutdown();
        if let Err(err) = engine_task.await {
            error!("Typing engine task failed: {err}");
        }

        hotkey_task.abort();
        if let Some(task) = update_task {
            task.abort();
        }
        if let Some(task) = control_task {
            task.abort();
        }
        // The status task exits once the engine's watch channel closes and
        // removes the status file on its way out.
        if let Err(err) = status_task.await {
            debug!("Status task ended abnormally: {err}");
        }

        Ok(())
    }

    fn build_parts(&self) -> Result<EngineParts> {
        let bridge = match self.options.strategy {
            StrategyChoice::Clipboard => None,
            _ => EnigoBridge::probe(),
        };
        let strategy = select_strategy(self.options.strategy, bridge.is_some())?;

        let registrar = GlobalHotkeyRegistrar::new()?;
        let hotkeys = HotkeyRegistry::new(Box::new(registrar));

        let parts = match (strategy, bridge) {
            (StrategyKind::Synthesis, Some(bridge)) => {
                info!("Using keystroke synthesis for typing");
                EngineParts {
                    injector: Box::new(SynthesisInjector::new(bridge.clone())),
                    hotkeys,
                    pointer: Some(Box::new(bridge)),
                }
            }
            _ => {
                info!(
                    "Using clipboard auto-paste for typing ({})",
                    SystemPaste::new().spec().display()
                );
                let clipboard = SystemClipboard::new()?;
                EngineParts {
                    injector: Box::new(ClipboardInjector::new(clipboard, SystemPaste::new())),
                    hotkeys,
                    pointer: None,
                }
            }
        };
        Ok(parts)
    }

    #[cfg(unix)]
    fn spawn_control(
        &self,
        handle: EngineHandle,
        updates: Option<UpdateChecker>,
    ) -> Option<JoinHandle<()>> {
        use crate::control::{ControlServer, ControlService};

        let service = ControlService::new(handle, self.settings.clone(), updates);
        match ControlServer::bind(&self.options.control_socket, service) {
            Ok(server) => Some(tokio::spawn(server.run())),
            Err(err) => {
                warn!("Control socket unavailable: {err:#}");
                None
            }
        }
    }

    #[cfg(not(unix))]
    fn spawn_control(
        &self,
        _handle: EngineHandle,
        _updates: Option<UpdateChecker>,
    ) -> Option<JoinHandle<()>> {
        debug!(
            path = %self.options.control_socket.display(),
            "Control socket is only available on Unix"
        );
        None
    }
}

/// Forwards OS hotkey presses to the engine.
fn spawn_hotkey_pump(handle: EngineHandle) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        let receiver = global_hotkey::GlobalHotKeyEvent::receiver();
        let mut ticker = tokio::time::interval(HOTKEY_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            pump_messages();

            while let Ok(event) = receiver.try_recv() {
                if event.state != global_hotkey::HotKeyState::Pressed {
                    continue;
                }
                if !handle.hotkey(event.id) {
                    return;
                }
            }
        }
    })
}

fn spawn_status_writer(
    mut handle: EngineHandle,
    writer: Option<StatusWriter>,
) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        let Some(writer) = writer else {
            return;
        };
        if let Err(err) = writer.set_state(handle.status()) {
            warn!("Failed to write status: {err:#}");
        }
        while let Ok(state) = handle.status_changed().await {
            if let Err(err) = writer.set_state(state) {
                warn!("Failed to write status: {err:#}");
            }
        }
        if let Err(err) = writer.cleanup() {
            warn!("Failed to remove status file: {err:#}");
        }
    })
}

/// Pump the Windows message queue so hotkey events are delivered.
fn pump_messages() {
    #[cfg(windows)]
    // SAFETY: MSG is a plain Windows struct; PeekMessageW, TranslateMessage,
    // and DispatchMessageW are standard message-loop calls with no invariants
    // beyond what the Windows API guarantees.
    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

pub fn resolve_settings_path(path: Option<&str>) -> Option<PathBuf> {
    path.map(crate::paths::expand_tilde)
}

pub fn load_settings(path: Option<&str>) -> Result<SettingsStore> {
    match resolve_settings_path(path) {
        Some(path) => SettingsStore::load_from(path),
        None => SettingsStore::load(),
    }
    .context("Failed to load settings")
}
