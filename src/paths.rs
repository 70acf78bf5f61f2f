use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "keysmash-rs";

/// Expands a leading `~/` in a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(trimmed)
}

/// ~/.config/keysmash-rs/ - persisted settings
pub fn config_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.config_dir().join(APP_DIR))
        .unwrap_or_else(|| env::temp_dir().join(APP_DIR))
}

/// ~/.cache/keysmash-rs/ - ephemeral status for desktop bars
pub fn cache_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.cache_dir().join(APP_DIR))
        .unwrap_or_else(|| env::temp_dir().join(APP_DIR))
}

/// $XDG_RUNTIME_DIR/keysmash-rs/ when available, the cache dir otherwise
pub fn runtime_dir() -> PathBuf {
    directories::BaseDirs::new()
        .and_then(|d| d.runtime_dir().map(|dir| dir.join(APP_DIR)))
        .unwrap_or_else(cache_dir)
}

pub fn settings_file() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn status_file() -> PathBuf {
    cache_dir().join("status.json")
}

pub fn control_socket() -> PathBuf {
    runtime_dir().join("control.sock")
}
