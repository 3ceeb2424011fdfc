//! Lifecycle of the single browser process owned by a session.
//!
//! ```text
//! Unstarted -> Launching -> Polling -> Ready -> Closed
//!                  |           |                  |
//!                  +-> Failed <+       (restart) <+
//! ```
//!
//! The startup lock is held for the whole launch, so callers arriving while
//! a launch is in flight wait for it and share its outcome instead of
//! spawning a second process. `Failed` is terminal for the session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as StateCell;
use proto::error::BrowserError;
use serde::Deserialize;
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::launcher::{BrowserLauncher, launch_args};
use crate::poll::{Probe, poll_until_ready};

const PROBE_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Observable supervisor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserState {
    Unstarted,
    Launching,
    Polling,
    Ready,
    Closed,
    /// Terminal; carries the original failure message.
    Failed(String),
}

/// Launch and readiness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Local remote-debugging port.
    pub port: u16,
    /// Persistent user-data directory; never deleted.
    pub profile_dir: PathBuf,
    pub headless: bool,
    /// Readiness probes before giving up.
    pub poll_attempts: u32,
    /// Delay between readiness probes.
    pub poll_interval: Duration,
}

impl SupervisorOptions {
    pub fn new(profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            port: 9222,
            profile_dir: profile_dir.into(),
            headless: false,
            poll_attempts: 50,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Address of a ready browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserEndpoint {
    /// Browser-level DevTools WebSocket URL.
    pub ws_url: String,
    pub port: u16,
    /// Increments on every successful launch; a change means any previous
    /// DevTools connection is stale.
    pub generation: u64,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

struct Handle {
    child: Child,
    endpoint: BrowserEndpoint,
}

struct Inner {
    handle: Option<Handle>,
    generation: u64,
    failure: Option<String>,
}

/// Owns exactly one browser process at a time.
pub struct BrowserSupervisor {
    launcher: Arc<dyn BrowserLauncher>,
    options: SupervisorOptions,
    inner: Mutex<Inner>,
    state: StateCell<BrowserState>,
}

impl BrowserSupervisor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: SupervisorOptions) -> Self {
        Self {
            launcher,
            options,
            inner: Mutex::new(Inner {
                handle: None,
                generation: 0,
                failure: None,
            }),
            state: StateCell::new(BrowserState::Unstarted),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BrowserState {
        self.state.lock().clone()
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Checks that a browser executable exists without launching it.
    pub fn locate(&self) -> Result<PathBuf, BrowserError> {
        self.launcher.locate()
    }

    /// Returns the ready browser, launching it first when needed.
    ///
    /// A ready handle is returned as-is without re-probing the endpoint.
    pub async fn ensure_ready(&self) -> Result<BrowserEndpoint, BrowserError> {
        let mut inner = self.inner.lock().await;

        if let Some(reason) = &inner.failure {
            return Err(BrowserError::StartupFailed(reason.clone()));
        }
        if let Some(handle) = &inner.handle {
            return Ok(handle.endpoint.clone());
        }

        match self.start(inner.generation + 1).await {
            Ok(handle) => {
                let endpoint = handle.endpoint.clone();
                inner.generation = endpoint.generation;
                inner.handle = Some(handle);
                self.set_state(BrowserState::Ready);
                info!(
                    port = endpoint.port,
                    generation = endpoint.generation,
                    "Browser ready"
                );
                Ok(endpoint)
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "Browser startup failed");
                inner.failure = Some(reason.clone());
                self.set_state(BrowserState::Failed(reason));
                Err(err)
            }
        }
    }

    /// Kills the browser process if one is running.
    ///
    /// Returns whether a process was released. Kill errors are logged and
    /// swallowed. The profile directory is left in place and a later
    /// [`ensure_ready`](Self::ensure_ready) starts a fresh process.
    pub async fn close(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(mut handle) = inner.handle.take() else {
            return false;
        };
        if let Err(e) = handle.child.kill().await {
            warn!(error = %e, "Failed to kill browser process");
        }
        self.set_state(BrowserState::Closed);
        info!(generation = handle.endpoint.generation, "Browser closed");
        true
    }

    async fn start(&self, generation: u64) -> Result<Handle, BrowserError> {
        self.set_state(BrowserState::Launching);
        let executable = self.launcher.locate()?;
        let args = launch_args(
            self.options.port,
            &self.options.profile_dir,
            self.options.headless,
        );
        let mut child = self.launcher.spawn(&executable, &args)?;

        self.set_state(BrowserState::Polling);
        match self.wait_for_endpoint(&mut child).await {
            Ok(ws_url) => Ok(Handle {
                child,
                endpoint: BrowserEndpoint {
                    ws_url,
                    port: self.options.port,
                    generation,
                },
            }),
            Err(err) => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Browser process already gone");
                }
                Err(err)
            }
        }
    }

    async fn wait_for_endpoint(&self, child: &mut Child) -> Result<String, BrowserError> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| BrowserError::Spawn(format!("HTTP client: {e}")))?;
        let url = format!("http://127.0.0.1:{}/json/version", self.options.port);

        let outcome = poll_until_ready(
            |attempt| {
                let exited = match child.try_wait() {
                    Ok(Some(status)) => Some(status.to_string()),
                    Ok(None) => None,
                    Err(e) => Some(e.to_string()),
                };
                let client = client.clone();
                let url = url.clone();
                async move {
                    if let Some(status) = exited {
                        return Probe::Abort(BrowserError::ProcessExited(status));
                    }
                    match fetch_ws_url(&client, &url).await {
                        Some(ws_url) => Probe::Ready(ws_url),
                        None => {
                            debug!(attempt, "Browser endpoint not ready");
                            Probe::Pending
                        }
                    }
                }
            },
            self.options.poll_attempts,
            self.options.poll_interval,
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(timeout) => Err(BrowserError::ReadinessTimeout {
                port: self.options.port,
                attempts: timeout.attempts,
            }),
        }
    }

    fn set_state(&self, next: BrowserState) {
        let mut state = self.state.lock();
        debug!(from = ?*state, to = ?next, "Browser state transition");
        *state = next;
    }
}

async fn fetch_ws_url(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let info: VersionInfo = response.json().await.ok()?;
    Some(info.web_socket_debugger_url)
}
