use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const VERSION_URL: &str =
    "https://raw.githubusercontent.com/jay-bman725/Keysmash/refs/heads/main/version";
pub const CHANGELOG_URL: &str =
    "https://raw.githubusercontent.com/jay-bman725/Keysmash/refs/heads/main/CHANGELOG.md";
pub const RELEASE_BASE_URL: &str = "https://github.com/jay-bman725/Keysmash/releases/tag/v";

pub const INITIAL_CHECK_DELAY: Duration = Duration::from_secs(5);
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const MIN_CHECK_SPACING: Duration = Duration::from_secs(5 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CHANGELOG_FALLBACK: &str = "Changelog not available";
const ANNOUNCEMENT_CAPACITY: usize = 8;

/// Compares dot-separated version strings component by component. Missing
/// components and components that are not numbers count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |version: &str| -> Vec<u64> {
        version
            .trim()
            .split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let left = parse(a);
    let right = parse(b);

    let len = left.len().max(right.len());
    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn release_url(version: &str) -> String {
    format!("{RELEASE_BASE_URL}{version}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub available: bool,
    pub current_version: String,
    pub new_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateSources {
    pub version_url: String,
    pub changelog_url: String,
}

impl Default for UpdateSources {
    fn default() -> Self {
        Self {
            version_url: VERSION_URL.to_string(),
            changelog_url: CHANGELOG_URL.to_string(),
        }
    }
}

/// Polls the published version file. Failures never leave this type; they
/// are logged and reported as "no result". Every check that finds a newer
/// release is also announced on the channel behind [`UpdateChecker::subscribe`].
#[derive(Clone)]
pub struct UpdateChecker {
    client: reqwest::Client,
    sources: UpdateSources,
    current_version: String,
    last_check: Arc<Mutex<Option<Instant>>>,
    announcements: broadcast::Sender<UpdateInfo>,
}

impl UpdateChecker {
    pub fn new() -> Result<Self> {
        Self::with_sources(UpdateSources::default(), env!("CARGO_PKG_VERSION"))
    }

    pub fn with_sources(sources: UpdateSources, current_version: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("keysmash-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            sources,
            current_version: current_version.to_string(),
            last_check: Arc::new(Mutex::new(None)),
            announcements: broadcast::channel(ANNOUNCEMENT_CAPACITY).0,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateInfo> {
        self.announcements.subscribe()
    }

    /// Returns `None` when the check was throttled or the remote version
    /// could not be fetched.
    pub async fn check_for_updates(&self) -> Option<UpdateInfo> {
        if !self.claim_slot() {
            debug!("Skipping update check; last check was under 5 minutes ago");
            return None;
        }

        info!("Checking for updates...");
        match self.check().await {
            Ok(info) => {
                if info.available {
                    info!(
                        "⬆️  Update available: {} -> {} ({})",
                        info.current_version,
                        info.new_version,
                        info.release_url.as_deref().unwrap_or_default()
                    );
                    let _ = self.announcements.send(info.clone());
                } else {
                    info!("No updates available");
                }
                Some(info)
            }
            Err(err) => {
                warn!("Update check failed: {err:#}");
                None
            }
        }
    }

    /// First check after [`INITIAL_CHECK_DELAY`], then every
    /// [`CHECK_INTERVAL`].
    pub fn spawn_periodic(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(INITIAL_CHECK_DELAY).await;
            let mut ticker = tokio::time::interval(CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                self.check_for_updates().await;
            }
        })
    }

    fn claim_slot(&self) -> bool {
        let Ok(mut last) = self.last_check.lock() else {
            return false;
        };
        let now = Instant::now();
        if let Some(previous) = *last {
            if now.duration_since(previous) < MIN_CHECK_SPACING {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    async fn check(&self) -> Result<UpdateInfo> {
        let remote = self.fetch_text(&self.sources.version_url).await?;
        let remote = remote.trim().to_string();
        if remote.is_empty() {
            return Err(anyhow!("Remote version file is empty"));
        }
        debug!(current = %self.current_version, remote = %remote, "Fetched remote version");

        if compare_versions(&remote, &self.current_version) != Ordering::Greater {
            return Ok(UpdateInfo {
                available: false,
                current_version: self.current_version.clone(),
                new_version: remote,
                changelog: None,
                release_url: None,
            });
        }

        let changelog = match self.fetch_text(&self.sources.changelog_url).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => CHANGELOG_FALLBACK.to_string(),
            Err(err) => {
                debug!("Changelog fetch failed: {err:#}");
                CHANGELOG_FALLBACK.to_string()
            }
        };

        Ok(UpdateInfo {
            available: true,
            current_version: self.current_version.clone(),
            release_url: Some(release_url(&remote)),
            new_version: remote,
            changelog: Some(changelog),
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("Unexpected response from {url}"))?;
        response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {url}"))
    }
}
