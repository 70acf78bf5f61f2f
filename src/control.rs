//! Local control protocol.
//!
//! One JSON request per line, one JSON response per line. A `watch` request
//! turns the connection into a stream of engine events and update
//! announcements that lasts until the client hangs up.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, EngineHandle};
use crate::settings::{Settings, SettingsStore, SettingsUpdate};
use crate::update::{UpdateChecker, UpdateInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ControlRequest {
    GetSettings,
    SaveSettings { settings: SettingsUpdate },
    SaveToHistory { text: String },
    StartTyping,
    StopTyping,
    ToggleTyping,
    GetTypingStatus,
    CheckForUpdates,
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ControlResponse {
    Settings {
        settings: Settings,
    },
    Saved {
        settings: Settings,
        hotkey_registered: bool,
    },
    History {
        history: Vec<String>,
    },
    Ok,
    TypingStatus {
        typing: bool,
    },
    Update {
        update: Option<UpdateInfo>,
    },
    Watching,
    Event {
        event: EngineEvent,
    },
    Error {
        message: String,
    },
}

/// What a `watch` client receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Engine(EngineEvent),
    UpdateAvailable(UpdateInfo),
}

impl ControlResponse {
    pub fn error(err: anyhow::Error) -> Self {
        Self::Error {
            message: format!("{err:#}"),
        }
    }
}

/// Answers control requests against the running engine and the settings
/// store. Transport-independent.
#[derive(Clone)]
pub struct ControlService {
    engine: EngineHandle,
    settings: SettingsStore,
    updates: Option<UpdateChecker>,
}

impl ControlService {
    pub fn new(
        engine: EngineHandle,
        settings: SettingsStore,
        updates: Option<UpdateChecker>,
    ) -> Self {
        Self {
            engine,
            settings,
            updates,
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Newer releases found by the update checker, if one is configured.
    pub fn update_announcements(&self) -> Option<broadcast::Receiver<UpdateInfo>> {
        self.updates.as_ref().map(UpdateChecker::subscribe)
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        debug!(?request, "Control request");
        match request {
            ControlRequest::GetSettings => ControlResponse::Settings {
                settings: self.settings.get(),
            },
            ControlRequest::SaveSettings { settings } => self.save_settings(settings).await,
            ControlRequest::SaveToHistory { text } => match self.settings.save_to_history(&text) {
                Ok(history) => ControlResponse::History { history },
                Err(err) => ControlResponse::error(err),
            },
            ControlRequest::StartTyping => self.ack(self.engine.start()),
            ControlRequest::StopTyping => self.ack(self.engine.stop()),
            ControlRequest::ToggleTyping => self.ack(self.engine.toggle()),
            ControlRequest::GetTypingStatus => ControlResponse::TypingStatus {
                typing: self.engine.status().is_typing(),
            },
            ControlRequest::CheckForUpdates => {
                let update = match &self.updates {
                    Some(checker) => checker.check_for_updates().await,
                    None => None,
                };
                ControlResponse::Update { update }
            }
            ControlRequest::Watch => ControlResponse::Watching,
        }
    }

    async fn save_settings(&self, update: SettingsUpdate) -> ControlResponse {
        let settings = match self.settings.save(update) {
            Ok(settings) => settings,
            Err(err) => return ControlResponse::error(err),
        };
        let hotkey_registered = match self.engine.rebind(&settings.hotkey).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Saved settings but hotkey {} is unusable: {err:#}", settings.hotkey);
                false
            }
        };
        info!("Settings saved");
        ControlResponse::Saved {
            settings,
            hotkey_registered,
        }
    }

    fn ack(&self, delivered: bool) -> ControlResponse {
        if delivered {
            ControlResponse::Ok
        } else {
            ControlResponse::error(anyhow!("Typing engine is not running"))
        }
    }
}

pub fn encode_line<T: Serialize>(value: &T) -> Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

#[cfg(unix)]
pub use socket::{request, watch, ControlServer};

#[cfg(unix)]
mod socket {
    use super::*;
    use anyhow::Context;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{UnixListener, UnixStream};
    use tokio::sync::broadcast::error::RecvError;

    pub struct ControlServer {
        listener: UnixListener,
        path: PathBuf,
        service: ControlService,
    }

    impl ControlServer {
        pub fn bind(path: impl Into<PathBuf>, service: ControlService) -> Result<Self> {
            let path = path.into();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create runtime directory")?;
            }
            if path.exists() {
                if std::os::unix::net::UnixStream::connect(&path).is_ok() {
                    return Err(anyhow!(
                        "Another instance is already listening on {}",
                        path.display()
                    ));
                }
                fs::remove_file(&path).context("Failed to remove stale control socket")?;
            }
            let listener = UnixListener::bind(&path)
                .with_context(|| format!("Failed to bind control socket {}", path.display()))?;
            info!("Control socket listening on {}", path.display());
            Ok(Self {
                listener,
                path,
                service,
            })
        }

        pub async fn run(self) {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let service = self.service.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, service).await {
                                debug!("Control connection ended: {err:#}");
                            }
                        });
                    }
                    Err(err) => {
                        warn!("Control socket accept failed: {err}");
                    }
                }
            }
        }
    }

    impl Drop for ControlServer {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    async fn serve_connection(stream: UnixStream, service: ControlService) -> Result<()> {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<ControlRequest>(&line) {
                Ok(ControlRequest::Watch) => {
                    return stream_events(&service, lines, write).await;
                }
                Ok(request) => service.handle(request).await,
                Err(err) => ControlResponse::Error {
                    message: format!("Invalid request: {err}"),
                },
            };
            write.write_all(encode_line(&response)?.as_bytes()).await?;
        }
        Ok(())
    }

    async fn stream_events(
        service: &ControlService,
        mut lines: tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
        mut write: tokio::net::unix::OwnedWriteHalf,
    ) -> Result<()> {
        let mut events = service.engine().subscribe();
        let mut updates = service.update_announcements();
        write
            .write_all(encode_line(&ControlResponse::Watching)?.as_bytes())
            .await?;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        let line = encode_line(&ControlResponse::Event { event })?;
                        write.write_all(line.as_bytes()).await?;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Watcher fell behind");
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
                update = next_update(&mut updates) => match update {
                    Ok(update) => {
                        let line = encode_line(&ControlResponse::Update {
                            update: Some(update),
                        })?;
                        write.write_all(line.as_bytes()).await?;
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => updates = None,
                },
                line = lines.next_line() => {
                    if line?.is_none() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn next_update(
        updates: &mut Option<broadcast::Receiver<UpdateInfo>>,
    ) -> Result<UpdateInfo, RecvError> {
        match updates {
            Some(updates) => updates.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn connect(path: &Path) -> Result<UnixStream> {
        UnixStream::connect(path).await.with_context(|| {
            format!(
                "Could not reach keysmash-rs at {} (is `keysmash-rs run` active?)",
                path.display()
            )
        })
    }

    /// Sends one request and waits for its response.
    pub async fn request(path: &Path, request: &ControlRequest) -> Result<ControlResponse> {
        let stream = connect(path).await?;
        let (read, mut write) = stream.into_split();
        write.write_all(encode_line(request)?.as_bytes()).await?;

        let mut lines = BufReader::new(read).lines();
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("Control socket closed without a response"))?;
        serde_json::from_str(&line).context("Malformed control response")
    }

    /// Streams engine events and update announcements to `on_notification`
    /// until the server goes away.
    pub async fn watch(
        path: &Path,
        mut on_notification: impl FnMut(Notification),
    ) -> Result<()> {
        let stream = connect(path).await?;
        let (read, mut write) = stream.into_split();
        write
            .write_all(encode_line(&ControlRequest::Watch)?.as_bytes())
            .await?;

        let mut lines = BufReader::new(read).lines();
        while let Some(line) = lines.next_line().await? {
            match serde_json::from_str(&line).context("Malformed control response")? {
                ControlResponse::Event { event } => {
                    on_notification(Notification::Engine(event))
                }
                ControlResponse::Update { update: Some(info) } => {
                    on_notification(Notification::UpdateAvailable(info))
                }
                ControlResponse::Watching => {}
                ControlResponse::Error { message } => return Err(anyhow!(message)),
                other => debug!(?other, "Unexpected response while watching"),
            }
        }
        Ok(())
    }
}
