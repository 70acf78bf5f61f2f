use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::engine::{StrategyKind, TypingState};
use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaybarState {
    Idle,
    Typing,
}

impl WaybarState {
    fn icon(&self) -> &'static str {
        match self {
            Self::Idle => "󰌌",   // keyboard
            Self::Typing => "󰌐", // keyboard with motion
        }
    }

    fn class(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Typing => "typing",
        }
    }
}

impl From<TypingState> for WaybarState {
    fn from(state: TypingState) -> Self {
        match state {
            TypingState::Idle => Self::Idle,
            TypingState::Typing => Self::Typing,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WaybarStatus {
    text: String,
    tooltip: String,
    class: String,
    alt: String,
}

/// Writes typing status for desktop bars to read (JSON format)
pub struct StatusWriter {
    status_file: PathBuf,
    strategy: StrategyKind,
    signal_bar: bool,
}

impl StatusWriter {
    pub fn new(strategy: StrategyKind) -> Result<Self> {
        Self::at(paths::status_file(), strategy, cfg!(target_os = "linux"))
    }

    pub fn at(status_file: PathBuf, strategy: StrategyKind, signal_bar: bool) -> Result<Self> {
        if let Some(parent) = status_file.parent() {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }
        Ok(Self {
            status_file,
            strategy,
            signal_bar,
        })
    }

    pub fn path(&self) -> &Path {
        &self.status_file
    }

    pub fn set_state(&self, state: TypingState) -> Result<()> {
        let state = WaybarState::from(state);
        let tooltip = match state {
            WaybarState::Idle => format!("Ready ({})", self.strategy.label()),
            WaybarState::Typing => format!("Typing since {}", local_clock()),
        };
        let status = WaybarStatus {
            text: state.icon().to_string(),
            tooltip,
            class: state.class().to_string(),
            alt: state.class().to_string(),
        };

        let json = serde_json::to_string(&status).context("Failed to serialize status")?;
        fs::write(&self.status_file, &json).context("Failed to write status file")?;

        tracing::debug!(state = ?state, tooltip = %status.tooltip, "Updated bar status");

        self.signal_waybar();
        Ok(())
    }

    /// Signal Waybar to refresh the custom module
    fn signal_waybar(&self) {
        if !self.signal_bar {
            return;
        }
        // SIGRTMIN+8 for custom module refresh
        let result = Command::new("pkill").args(["-RTMIN+8", "waybar"]).status();

        if let Err(e) = result {
            tracing::debug!("Failed to signal waybar: {}", e);
        }
    }

    /// Clean up status file on shutdown
    pub fn cleanup(&self) -> Result<()> {
        if self.status_file.exists() {
            fs::remove_file(&self.status_file).context("Failed to remove status file")?;
            self.signal_waybar();
        }
        Ok(())
    }
}

fn local_clock() -> String {
    let format = time::macros::format_description!("[hour]:[minute]:[second]");
    time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .format(&format)
        .unwrap_or_else(|_| "unknown".to_string())
}
