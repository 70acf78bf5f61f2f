mod clipboard;
mod hotkeys;
mod paste;
mod synth;

pub use clipboard::{ClipboardAccess, SystemClipboard};
pub use hotkeys::{
    parse_accelerator, GlobalHotkeyRegistrar, HotkeyAction, HotkeyRegistrar, HotkeyRegistry,
};
pub use paste::{paste_command_for, OsFamily, PasteCommand, PasteCommandSpec, SystemPaste};
pub use synth::{EnigoBridge, KeystrokeSynth, PointerSource};
