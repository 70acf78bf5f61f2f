use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    MacOs,
    Windows,
    Unix,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

/// An external program that sends the platform paste shortcut to the
/// focused window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteCommandSpec {
    pub program: &'static str,
    pub args: Vec<&'static str>,
}

impl PasteCommandSpec {
    pub fn display(&self) -> String {
        let mut line = self.program.to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

pub fn paste_command_for(os: OsFamily) -> PasteCommandSpec {
    match os {
        OsFamily::MacOs => PasteCommandSpec {
            program: "osascript",
            args: vec![
                "-e",
                r#"tell application "System Events" to keystroke "v" using command down"#,
            ],
        },
        OsFamily::Windows => PasteCommandSpec {
            program: "powershell",
            args: vec![
                "-command",
                "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('^v')",
            ],
        },
        OsFamily::Unix => PasteCommandSpec {
            program: "xdotool",
            args: vec!["key", "ctrl+v"],
        },
    }
}

#[async_trait(?Send)]
pub trait PasteCommand {
    async fn paste(&self) -> Result<()>;
}

pub struct SystemPaste {
    spec: PasteCommandSpec,
}

impl SystemPaste {
    pub fn new() -> Self {
        Self::with_spec(paste_command_for(OsFamily::current()))
    }

    pub fn with_spec(spec: PasteCommandSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &PasteCommandSpec {
        &self.spec
    }
}

impl Default for SystemPaste {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl PasteCommand for SystemPaste {
    async fn paste(&self) -> Result<()> {
        trace!(command = %self.spec.display(), "Sending paste shortcut");
        let output = Command::new(self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.spec.program))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(anyhow!(
                "{} exited with {}: {}",
                self.spec.program,
                output.status,
                stderr.trim()
            ))
        }
    }
}
