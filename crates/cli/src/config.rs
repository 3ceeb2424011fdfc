use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tools::SupervisorOptions;
use tracing::debug;

const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_WORKSPACE_ROOT: &str = "agent";
const LOCAL_CONFIG_FILE: &str = "agent-browse.toml";

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM model and credential.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Browser process settings.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Working directory layout.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Agent model/credential config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model ID.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key (`ANTHROPIC_API_KEY` overrides at load time).
    #[serde(default)]
    pub api_key: String,
    /// Messages API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// LLM round trips allowed per human turn.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_turns() -> usize {
    agent::DEFAULT_MAX_TURNS
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            base_url: default_base_url(),
            max_turns: default_max_turns(),
        }
    }
}

/// Browser process config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Explicit executable path. Empty means auto-detect.
    #[serde(default)]
    pub executable: String,
    /// Remote debugging port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub headless: bool,
    /// Launch the browser before the first turn.
    #[serde(default = "default_true")]
    pub prewarm: bool,
    /// Readiness probes before giving up.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    /// Delay between readiness probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_port() -> u16 {
    9222
}

fn default_true() -> bool {
    true
}

fn default_poll_attempts() -> u32 {
    50
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: String::new(),
            port: default_port(),
            headless: false,
            prewarm: default_true(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BrowserConfig {
    /// Executable override, if one is configured.
    pub fn executable_override(&self) -> Option<PathBuf> {
        let trimmed = self.executable.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    /// Supervisor settings with the browser profile kept at `profile_dir`.
    pub fn supervisor_options(&self, profile_dir: impl Into<PathBuf>) -> SupervisorOptions {
        let mut options = SupervisorOptions::new(profile_dir);
        options.port = self.port;
        options.headless = self.headless;
        options.poll_attempts = self.poll_attempts.max(1);
        options.poll_interval = Duration::from_millis(self.poll_interval_ms);
        options
    }
}

/// Working directory config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Working root; relative paths resolve against the current directory.
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(DEFAULT_WORKSPACE_ROOT)
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
        }
    }
}

impl WorkspaceConfig {
    /// Absolute working root.
    pub fn resolved_root(&self) -> Result<PathBuf, ConfigError> {
        if self.root.is_absolute() {
            return Ok(self.root.clone());
        }
        Ok(std::env::current_dir()?.join(&self.root))
    }
}

/// `~/.agent-browse`, home of the user config and debug logs.
pub fn app_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".agent-browse")
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            let local = std::env::current_dir().ok()?.join(LOCAL_CONFIG_FILE);
            if local.exists() {
                return Some(local);
            }
            let user = app_dir().join("config.toml");
            user.exists().then_some(user)
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config: Config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        if let Some(key) = non_empty_env("ANTHROPIC_API_KEY") {
            config.agent.api_key = key;
        }
        if let Some(model) = non_empty_env("ANTHROPIC_MODEL") {
            config.agent.model = model;
        }
        if let Some(chrome) = non_empty_env("AGENT_BROWSE_CHROME") {
            config.browser.executable = chrome;
        }

        debug!(
            model = %config.agent.model,
            base_url = %config.agent.base_url,
            port = config.browser.port,
            workspace = %config.workspace.root.display(),
            "Config loaded"
        );
        Ok(config)
    }

    /// The API credential. Its absence is fatal.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        let key = self.agent.api_key.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingField("ANTHROPIC_API_KEY".to_string()));
        }
        Ok(key)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
