//! Global hotkey registration.
//!
//! Accelerators use the `Modifier+Modifier+Key` form stored in settings,
//! e.g. `Ctrl+Shift+T` or `CmdOrCtrl+C`.

use anyhow::{anyhow, bail, Context, Result};
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::GlobalHotKeyManager;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Parses an accelerator string into a registrable hotkey.
pub fn parse_accelerator(accelerator: &str) -> Result<HotKey> {
    let parts: Vec<&str> = accelerator
        .split('+')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    let Some((key, modifier_parts)) = parts.split_last() else {
        bail!("Empty hotkey");
    };

    let mut modifiers = Modifiers::empty();
    for modifier in modifier_parts {
        modifiers |= parse_modifier(modifier)
            .with_context(|| format!("Invalid hotkey {accelerator}"))?;
    }
    let code = parse_key(key).with_context(|| format!("Invalid hotkey {accelerator}"))?;

    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    Ok(HotKey::new(modifiers, code))
}

fn parse_modifier(modifier: &str) -> Result<Modifiers> {
    match modifier.to_uppercase().as_str() {
        "CMDORCTRL" | "COMMANDORCONTROL" => Ok(if cfg!(target_os = "macos") {
            Modifiers::SUPER
        } else {
            Modifiers::CONTROL
        }),
        "CMD" | "COMMAND" | "SUPER" | "META" | "WIN" => Ok(Modifiers::SUPER),
        "CTRL" | "CONTROL" => Ok(Modifiers::CONTROL),
        "ALT" | "OPTION" => Ok(Modifiers::ALT),
        "SHIFT" => Ok(Modifiers::SHIFT),
        _ => bail!("Invalid modifier: {modifier}"),
    }
}

fn parse_key(key: &str) -> Result<Code> {
    let upper = key.to_uppercase();
    let code = match upper.as_str() {
        "SPACE" => Code::Space,
        "ENTER" | "RETURN" => Code::Enter,
        "TAB" => Code::Tab,
        "BACKSPACE" => Code::Backspace,
        "DELETE" | "DEL" => Code::Delete,
        "INSERT" => Code::Insert,
        "ESC" | "ESCAPE" => Code::Escape,
        "HOME" => Code::Home,
        "END" => Code::End,
        "PAGEUP" => Code::PageUp,
        "PAGEDOWN" => Code::PageDown,
        "UP" => Code::ArrowUp,
        "DOWN" => Code::ArrowDown,
        "LEFT" => Code::ArrowLeft,
        "RIGHT" => Code::ArrowRight,
        "F1" => Code::F1,
        "F2" => Code::F2,
        "F3" => Code::F3,
        "F4" => Code::F4,
        "F5" => Code::F5,
        "F6" => Code::F6,
        "F7" => Code::F7,
        "F8" => Code::F8,
        "F9" => Code::F9,
        "F10" => Code::F10,
        "F11" => Code::F11,
        "F12" => Code::F12,
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,
        "A" => Code::KeyA,
        "B" => Code::KeyB,
        "C" => Code::KeyC,
        "D" => Code::KeyD,
        "E" => Code::KeyE,
        "F" => Code::KeyF,
        "G" => Code::KeyG,
        "H" => Code::KeyH,
        "I" => Code::KeyI,
        "J" => Code::KeyJ,
        "K" => Code::KeyK,
        "L" => Code::KeyL,
        "M" => Code::KeyM,
        "N" => Code::KeyN,
        "O" => Code::KeyO,
        "P" => Code::KeyP,
        "Q" => Code::KeyQ,
        "R" => Code::KeyR,
        "S" => Code::KeyS,
        "T" => Code::KeyT,
        "U" => Code::KeyU,
        "V" => Code::KeyV,
        "W" => Code::KeyW,
        "X" => Code::KeyX,
        "Y" => Code::KeyY,
        "Z" => Code::KeyZ,
        _ => bail!("Invalid key: {key}"),
    };
    Ok(code)
}

/// The OS-facing side of hotkey registration.
pub trait HotkeyRegistrar {
    /// Registers an accelerator and returns the id its press events carry.
    fn register(&mut self, accelerator: &str) -> Result<u32>;

    fn unregister(&mut self, id: u32) -> Result<()>;
}

/// Registers hotkeys with the OS. Press events arrive on
/// `global_hotkey::GlobalHotKeyEvent::receiver()`.
pub struct GlobalHotkeyRegistrar {
    manager: GlobalHotKeyManager,
    registered: HashMap<u32, HotKey>,
}

impl GlobalHotkeyRegistrar {
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("Failed to create hotkey manager")?;
        Ok(Self {
            manager,
            registered: HashMap::new(),
        })
    }
}

impl HotkeyRegistrar for GlobalHotkeyRegistrar {
    fn register(&mut self, accelerator: &str) -> Result<u32> {
        let hotkey = parse_accelerator(accelerator)?;
        self.manager
            .register(hotkey)
            .map_err(|err| anyhow!("Failed to register hotkey {accelerator}: {err}"))?;
        let id = hotkey.id();
        self.registered.insert(id, hotkey);
        Ok(id)
    }

    fn unregister(&mut self, id: u32) -> Result<()> {
        let Some(hotkey) = self.registered.remove(&id) else {
            return Ok(());
        };
        self.manager
            .unregister(hotkey)
            .map_err(|err| anyhow!("Failed to unregister hotkey: {err}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    /// The user's start/stop hotkey.
    Toggle,
    Panic,
    /// One of the shortcuts that cancel clipboard typing.
    Interrupt,
}

#[derive(Debug, Clone)]
struct Binding {
    accelerator: String,
    action: HotkeyAction,
}

/// Tracks which registered id maps to which engine action.
pub struct HotkeyRegistry {
    registrar: Box<dyn HotkeyRegistrar>,
    bindings: HashMap<u32, Binding>,
    primary: Option<u32>,
    primary_accelerator: Option<String>,
}

impl HotkeyRegistry {
    pub fn new(registrar: Box<dyn HotkeyRegistrar>) -> Self {
        Self {
            registrar,
            bindings: HashMap::new(),
            primary: None,
            primary_accelerator: None,
        }
    }

    /// Replaces the start/stop hotkey. The accelerator is remembered even
    /// when registration fails so a later re-establish can retry it.
    pub fn bind_primary(&mut self, accelerator: &str) -> Result<()> {
        if let Some(id) = self.primary.take() {
            self.release(id);
        }
        self.primary_accelerator = Some(accelerator.to_string());
        let id = self.bind(accelerator, HotkeyAction::Toggle)?;
        self.primary = Some(id);
        Ok(())
    }

    pub fn primary_registered(&self) -> bool {
        self.primary.is_some()
    }

    pub fn bind(&mut self, accelerator: &str, action: HotkeyAction) -> Result<u32> {
        let id = self.registrar.register(accelerator)?;
        self.bindings.insert(
            id,
            Binding {
                accelerator: accelerator.to_string(),
                action,
            },
        );
        Ok(id)
    }

    pub fn release(&mut self, id: u32) {
        if self.bindings.remove(&id).is_none() {
            return;
        }
        if self.primary == Some(id) {
            self.primary = None;
        }
        if let Err(err) = self.registrar.unregister(id) {
            debug!("Hotkey release failed: {err:#}");
        }
    }

    /// Registers the start/stop hotkey again after interrupt shortcuts
    /// have been torn down.
    pub fn reestablish_primary(&mut self) {
        let Some(accelerator) = self.primary_accelerator.clone() else {
            return;
        };
        if let Err(err) = self.bind_primary(&accelerator) {
            warn!("Failed to re-register start/stop hotkey {accelerator}: {err:#}");
        }
    }

    pub fn release_all(&mut self) {
        let ids: Vec<u32> = self.bindings.keys().copied().collect();
        for id in ids {
            self.release(id);
        }
    }

    pub fn action_for(&self, id: u32) -> Option<HotkeyAction> {
        self.bindings.get(&id).map(|binding| binding.action)
    }

    pub fn describe(&self, id: u32) -> Option<&str> {
        self.bindings
            .get(&id)
            .map(|binding| binding.accelerator.as_str())
    }
}
