use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::paths;

pub const DEFAULT_TEXT: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";
pub const DEFAULT_DELAY_MS: u64 = 50;
pub const HISTORY_LIMIT: usize = 10;

pub fn default_hotkey() -> &'static str {
    if cfg!(target_os = "macos") {
        "Cmd+Shift+T"
    } else {
        "Ctrl+Shift+T"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub text: String,
    /// Inter-character delay in milliseconds.
    pub delay: u64,
    #[serde(rename = "loop")]
    pub loop_typing: bool,
    pub hotkey: String,
    pub history: Vec<String>,
    pub check_for_updates: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_string(),
            delay: DEFAULT_DELAY_MS,
            loop_typing: false,
            hotkey: default_hotkey().to_string(),
            history: Vec::new(),
            check_for_updates: true,
        }
    }
}

impl Settings {
    /// Inserts `text` at the front of the history unless an identical entry
    /// already exists. Returns whether the history changed.
    pub fn remember(&mut self, text: &str) -> bool {
        if self.history.iter().any(|entry| entry == text) {
            return false;
        }
        self.history.insert(0, text.to_string());
        self.history.truncate(HISTORY_LIMIT);
        true
    }
}

/// Fields accepted by `save-settings`. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(
        rename = "loop",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub loop_typing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.delay.is_none()
            && self.loop_typing.is_none()
            && self.hotkey.is_none()
    }

    fn apply(self, settings: &mut Settings) {
        if let Some(text) = self.text {
            settings.text = text;
        }
        if let Some(delay) = self.delay {
            settings.delay = delay;
        }
        if let Some(loop_typing) = self.loop_typing {
            settings.loop_typing = loop_typing;
        }
        if let Some(hotkey) = self.hotkey {
            let trimmed = hotkey.trim();
            settings.hotkey = if trimmed.is_empty() {
                default_hotkey().to_string()
            } else {
                trimmed.to_string()
            };
        }
    }
}

/// Persistent key/value settings shared between the engine and the control
/// surface. Every successful update is written to disk and published to
/// subscribers.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    tx: watch::Sender<Settings>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn load() -> Result<Self> {
        Self::load_from(paths::settings_file())
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings at {}", path.display()))?;
            parse_settings(&contents)
                .with_context(|| format!("Invalid settings file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "No settings file yet; using defaults");
            Settings::default()
        };

        info!("Settings loaded from {}", path.display());
        let (tx, _rx) = watch::channel(settings);
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                tx,
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn get(&self) -> Settings {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.inner.tx.subscribe()
    }

    pub fn save(&self, update: SettingsUpdate) -> Result<Settings> {
        self.modify(|settings| {
            update.apply(settings);
            true
        })
    }

    /// Records a submitted text in the capped history and returns the list,
    /// most recent first.
    pub fn save_to_history(&self, text: &str) -> Result<Vec<String>> {
        let settings = self.modify(|settings| settings.remember(text))?;
        Ok(settings.history)
    }

    fn modify(&self, change: impl FnOnce(&mut Settings) -> bool) -> Result<Settings> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .map_err(|_| anyhow!("Settings lock poisoned"))?;

        let mut next = self.get();
        if !change(&mut next) {
            return Ok(next);
        }

        self.persist(&next)?;
        self.inner.tx.send_replace(next.clone());
        Ok(next)
    }

    fn persist(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.inner.path.parent() {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        let json =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
        fs::write(&self.inner.path, json).context("Failed to write settings file")?;
        debug!(path = %self.inner.path.display(), "Settings persisted");
        Ok(())
    }
}

fn parse_settings(contents: &str) -> Result<Settings> {
    let value = jsonc_parser::parse_to_serde_value(contents, &Default::default())
        .map_err(|err| anyhow!("{err}"))?;
    match value {
        Some(value) => serde_json::from_value(value).context("Unexpected settings structure"),
        None => Ok(Settings::default()),
    }
}
