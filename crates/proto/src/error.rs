use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// LLM provider or agent stream error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Tool registration/execution error.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Browser process lifecycle error.
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Conversation session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Internal protocol type error.
    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// LLM provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Remote API failure.
    #[error("{0}")]
    Api(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider response schema/content was invalid.
    #[error("Invalid response from LLM: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Tool execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested tool is unknown.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Tool process or operation failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool exceeded allowed execution time.
    #[error("Timeout after {0}s")]
    Timeout(u64),

    /// Tool call arguments are invalid.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Filesystem/process IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Browser process supervisor errors
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// No usable browser executable was found on this machine.
    #[error("No Chrome/Chromium executable found. {install_hint}")]
    ExecutableNotFound { install_hint: String },

    /// The executable was found but the process could not be started.
    #[error("Failed to launch browser: {0}")]
    Spawn(String),

    /// The control endpoint never answered within the polling bound.
    #[error("Browser control endpoint on port {port} not ready after {attempts} attempts")]
    ReadinessTimeout { port: u16, attempts: u32 },

    /// The browser process exited before it became ready.
    #[error("Browser process exited during startup: {0}")]
    ProcessExited(String),

    /// An earlier startup failure is terminal for this session.
    #[error("Browser startup previously failed: {0}")]
    StartupFailed(String),

    /// DevTools protocol failure after the browser became ready.
    #[error("DevTools protocol error: {0}")]
    Cdp(String),
}

/// Conversation session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading human input failed.
    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),

    /// The agent stream is no longer accepting messages.
    #[error("Agent stream closed")]
    StreamClosed,
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Invalid role string value.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Generic serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::MissingField("ANTHROPIC_API_KEY".to_string());
        assert!(err.to_string().contains("Missing required field"));
    }

    #[test]
    fn wraps_llm_error_into_top_level_error() {
        let err: Error = LlmError::RateLimit.into();
        assert!(err.to_string().contains("LLM error"));
        assert!(err.to_string().contains("Rate limit exceeded"));
    }

    #[test]
    fn browser_not_found_message_carries_install_hint() {
        let err = BrowserError::ExecutableNotFound {
            install_hint: "Install it with: brew install --cask google-chrome".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("No Chrome/Chromium executable found"));
        assert!(text.contains("brew install"));
    }

    #[test]
    fn readiness_timeout_names_port_and_attempts() {
        let err: Error = BrowserError::ReadinessTimeout {
            port: 9222,
            attempts: 50,
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("Browser error"));
        assert!(text.contains("9222"));
        assert!(text.contains("50 attempts"));
    }

    #[test]
    fn wraps_tool_session_and_proto_errors() {
        let tool_err: Error = ToolError::InvalidArgs("missing url".to_string()).into();
        assert!(tool_err.to_string().contains("Tool error"));

        let session_err: Error = SessionError::StreamClosed.into();
        assert!(session_err.to_string().contains("Agent stream closed"));

        let proto_err: Error = ProtoError::InvalidRole("owner".to_string()).into();
        assert!(proto_err.to_string().contains("Proto error"));
    }
}
