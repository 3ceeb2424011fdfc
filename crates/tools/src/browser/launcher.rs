//! Locating and spawning a local Chromium-family browser.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use proto::error::BrowserError;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Finds and starts the browser executable.
///
/// The supervisor only talks to this seam, so tests can stand in any
/// long-running process for the real browser.
pub trait BrowserLauncher: Send + Sync {
    /// Resolves the executable to run.
    fn locate(&self) -> Result<PathBuf, BrowserError>;

    /// Starts the process. The child must be killed when dropped.
    fn spawn(&self, executable: &Path, args: &[String]) -> Result<Child, BrowserError>;
}

/// Launcher for Chrome, Chromium, Brave and Edge.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    executable_override: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(executable_override: Option<PathBuf>) -> Self {
        Self {
            executable_override: executable_override.filter(|p| !p.as_os_str().is_empty()),
        }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn locate(&self) -> Result<PathBuf, BrowserError> {
        if let Some(path) = &self.executable_override {
            return resolve_candidate(&path.to_string_lossy()).ok_or_else(|| {
                BrowserError::ExecutableNotFound {
                    install_hint: format!(
                        "Configured browser '{}' does not exist. {}",
                        path.display(),
                        install_hint()
                    ),
                }
            });
        }

        candidates()
            .iter()
            .find_map(|candidate| resolve_candidate(candidate))
            .ok_or_else(|| BrowserError::ExecutableNotFound {
                install_hint: install_hint().to_string(),
            })
    }

    fn spawn(&self, executable: &Path, args: &[String]) -> Result<Child, BrowserError> {
        info!(browser = %executable.display(), "Launching browser");
        debug!(?args, "Browser arguments");
        Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Spawn(format!("{}: {e}", executable.display())))
    }
}

/// Command-line arguments for a debuggable browser with a persistent profile.
pub fn launch_args(port: u16, profile_dir: &Path, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={port}"),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--window-size=1280,900".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}

/// Platform-specific remedy shown when no browser is installed.
pub fn install_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install Google Chrome with `brew install --cask google-chrome` or from https://www.google.com/chrome/"
    } else if cfg!(target_os = "windows") {
        "Install Google Chrome with `winget install Google.Chrome` or from https://www.google.com/chrome/"
    } else {
        "Install Chromium with `sudo apt install chromium` (or `sudo dnf install chromium`), or Google Chrome from https://www.google.com/chrome/"
    }
}

fn candidates() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "brave-browser",
            "microsoft-edge",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
    }
}

/// Absolute or relative paths must exist; bare names are looked up on `PATH`.
fn resolve_candidate(candidate: &str) -> Option<PathBuf> {
    let path = Path::new(candidate);
    if path.exists() {
        return Some(path.to_path_buf());
    }
    if candidate.contains('/') || candidate.contains('\\') {
        return None;
    }
    which::which(candidate).ok()
}
