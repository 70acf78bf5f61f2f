use anyhow::{Context, Result};
use arboard::Clipboard;
use tracing::{debug, warn};

#[cfg(target_os = "linux")]
use wl_clipboard_rs::copy::{ClipboardType, Error as WlCopyError, MimeType, Options, Source};

/// Plain-text clipboard access.
pub trait ClipboardAccess {
    /// Returns the current text contents; an empty or non-text clipboard
    /// reads as `""`.
    fn read_text(&mut self) -> Result<String>;

    fn write_text(&mut self, text: &str) -> Result<()>;
}

pub struct SystemClipboard {
    clipboard: Clipboard,
    wayland_clipboard_enabled: bool,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = Clipboard::new().context("Failed to initialize clipboard")?;
        let wayland_clipboard_enabled =
            cfg!(target_os = "linux") && std::env::var("WAYLAND_DISPLAY").is_ok();
        if wayland_clipboard_enabled {
            debug!("Wayland session detected; writing through wl-clipboard first");
        }
        Ok(Self {
            clipboard,
            wayland_clipboard_enabled,
        })
    }

    #[cfg(target_os = "linux")]
    fn copy_wayland_clipboard(&self, text: &str) -> Result<(), WlCopyError> {
        let bytes = text.as_bytes().to_vec();

        let mut both = Options::new();
        both.clipboard(ClipboardType::Both);
        match both.copy(
            Source::Bytes(bytes.clone().into_boxed_slice()),
            MimeType::Text,
        ) {
            Ok(_) => Ok(()),
            Err(WlCopyError::PrimarySelectionUnsupported) => {
                let mut regular = Options::new();
                regular.clipboard(ClipboardType::Regular);
                regular.copy(Source::Bytes(bytes.into_boxed_slice()), MimeType::Text)
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(target_os = "linux")]
    fn write_wayland(&mut self, text: &str) -> bool {
        if !self.wayland_clipboard_enabled || text.is_empty() {
            return false;
        }
        match self.copy_wayland_clipboard(text) {
            Ok(()) => true,
            Err(err) => {
                warn!("Wayland clipboard copy failed (falling back to arboard): {err:?}");
                self.wayland_clipboard_enabled = false;
                false
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn write_wayland(&mut self, _text: &str) -> bool {
        let _ = self.wayland_clipboard_enabled;
        false
    }
}

impl ClipboardAccess for SystemClipboard {
    fn read_text(&mut self) -> Result<String> {
        match self.clipboard.get_text() {
            Ok(text) => Ok(text),
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(err) => Err(err).context("Failed to read clipboard"),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        if self.write_wayland(text) {
            return Ok(());
        }
        if text.is_empty() {
            return self.clipboard.clear().context("Failed to clear clipboard");
        }
        self.clipboard
            .set_text(text)
            .context("Failed to copy text to clipboard")
    }
}
