//! Process signal handling.

use tracing::{info, warn};

/// SIGINT/SIGTERM listener.
///
/// Handlers are registered by [`Shutdown::install`], so a signal that
/// arrives before anyone awaits [`Shutdown::recv`] is still caught and
/// reported on the next call instead of killing the process outright.
pub struct Shutdown {
    #[cfg(unix)]
    interrupt: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
}

impl Shutdown {
    /// Registers the handlers. Must be called inside the runtime.
    ///
    /// A handler that cannot be installed is logged and never fires.
    pub fn install() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let register = |kind: SignalKind, name: &str| match signal(kind) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!("Failed to register {name} handler: {e}");
                    None
                }
            };
            Self {
                interrupt: register(SignalKind::interrupt(), "SIGINT"),
                terminate: register(SignalKind::terminate(), "SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        Self {}
    }

    /// Waits for the next SIGINT or SIGTERM.
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        tokio::select! {
            _ = next(&mut self.interrupt) => info!("Received SIGINT, shutting down"),
            _ = next(&mut self.terminate) => info!("Received SIGTERM, shutting down"),
        }

        #[cfg(not(unix))]
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(unix)]
async fn next(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
