//! CLI entrypoint: wires the browser, the agent stream, and the conversation loop.

mod config;
mod input;
mod render;
mod signals;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use agent::{
    AgentStream, AnthropicProvider, ConversationLoop, PolicyGate, SessionOutcome, StreamConfig,
    ToolRegistry,
};
use anyhow::Context;
use clap::Parser;
use tools::{BrowserSession, BrowserSupervisor, ChromeLauncher, WorkspaceLayout};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::input::LineInput;
use crate::render::ConsoleRenderer;
use crate::signals::Shutdown;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "agent-browse")]
#[command(about = "Chat with an agent that drives your local Chrome", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Enable debug logging to ~/.agent-browse/logs/
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Initial prompt; words are joined with spaces
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    prompt: Vec<String>,
}

impl Cli {
    fn initial_prompt(&self) -> Option<String> {
        let joined = self.prompt.join(" ");
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut shutdown = Shutdown::install();
    let _file_guard = init_tracing(&cli.log_level, cli.debug);
    if cli.debug {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            log_level = %cli.log_level,
            "========== agent-browse session start =========="
        );
    }

    let mut renderer = ConsoleRenderer::stdout();
    let result = run(cli, &mut renderer, &mut shutdown).await;
    if let Err(e) = &result {
        error!("{e:#}");
        renderer.fatal(&format!("{e:#}"));
    }
    let code = exit_code(&result);
    drop(_file_guard);
    // Exit explicitly: the stdin reader thread would otherwise keep the runtime alive.
    std::process::exit(code);
}

/// Tracing to stderr, plus a daily-rolling debug file with `--debug`.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(
    log_level: &str,
    debug: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    if !debug {
        tracing_subscriber::registry().with(console).init();
        return None;
    }

    let log_dir = config::app_dir().join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .with_filter(EnvFilter::new(
            "debug,hyper_util=info,rustls=info,reqwest=info,tungstenite=info,chromiumoxide=info",
        ));
    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();
    Some(guard)
}

/// How the conversation phase ended.
#[derive(Debug)]
enum SessionEnd {
    Finished(Result<SessionOutcome, proto::Error>),
    Interrupted,
}

/// Runs one session and returns the process exit code.
async fn run(
    cli: Cli,
    renderer: &mut ConsoleRenderer<std::io::Stdout>,
    shutdown: &mut Shutdown,
) -> anyhow::Result<i32> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let api_key = config.require_api_key()?.to_string();

    let layout = WorkspaceLayout::new(config.workspace.resolved_root()?);
    layout.prepare().with_context(|| {
        format!(
            "Failed to prepare workspace at {}",
            layout.root().display()
        )
    })?;

    let launcher = Arc::new(ChromeLauncher::new(config.browser.executable_override()));
    let supervisor = Arc::new(BrowserSupervisor::new(
        launcher,
        config.browser.supervisor_options(layout.profile_dir()),
    ));
    let browser = Arc::new(BrowserSession::new(
        supervisor.clone(),
        layout.downloads_dir(),
        layout.screenshots_dir(),
    ));

    // Dropping an unfinished launch kills the child process.
    tokio::select! {
        result = preflight(&config, &supervisor, renderer) => result?,
        _ = shutdown.recv() => return teardown(&browser, SessionEnd::Interrupted).await,
    }

    let registry = Arc::new(ToolRegistry::with_tools(tools::default_tools(
        &layout,
        browser.clone(),
    )));
    let llm = Arc::new(AnthropicProvider::with_base_url(
        api_key,
        config.agent.base_url.clone(),
    ));
    let mut stream_config = StreamConfig::new(config.agent.model.clone());
    stream_config.max_turns = config.agent.max_turns;
    let AgentStream {
        inbound,
        events,
        task,
    } = AgentStream::spawn(llm, registry.definitions(), stream_config);

    let gate = PolicyGate::new(layout.root(), layout.scripts_dir());
    let mut conversation = ConversationLoop::new(inbound, events, gate, registry);
    let mut input = LineInput::stdin();
    info!(
        model = %config.agent.model,
        workspace = %layout.root().display(),
        "Session started"
    );

    let end = tokio::select! {
        result = conversation.run(cli.initial_prompt(), &mut input, renderer) => SessionEnd::Finished(result),
        _ = shutdown.recv() => SessionEnd::Interrupted,
    };
    task.abort();
    info!(turns = conversation.turns().len(), "Conversation over");
    teardown(&browser, end).await
}

/// Starts the browser up front, or with prewarm off only checks that one
/// is installed.
async fn preflight(
    config: &Config,
    supervisor: &BrowserSupervisor,
    renderer: &mut ConsoleRenderer<std::io::Stdout>,
) -> anyhow::Result<()> {
    if config.browser.prewarm {
        renderer.status("Starting browser...");
        let endpoint = supervisor.ensure_ready().await?;
        info!(port = endpoint.port, "Browser prewarmed");
        renderer.status("Browser ready");
    } else {
        let exe = supervisor.locate()?;
        info!(executable = %exe.display(), "Browser executable found");
    }
    Ok(())
}

/// Releases the browser on every exit path and maps how the session ended
/// to an exit code. Close failures are logged, never fatal.
async fn teardown(browser: &BrowserSession, end: SessionEnd) -> anyhow::Result<i32> {
    if browser.close().await {
        info!("Browser closed");
    }
    match end {
        SessionEnd::Finished(Ok(how)) => {
            info!(outcome = ?how, "Session finished");
            Ok(0)
        }
        SessionEnd::Interrupted => {
            warn!("Session interrupted by signal");
            Ok(0)
        }
        SessionEnd::Finished(Err(e)) => Err(anyhow::Error::new(e).context("Session failed")),
    }
}

fn exit_code(result: &anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => *code,
        Err(_) => 1,
    }
}
