use std::sync::{Mutex, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Serializes tests that touch process environment variables.
///
/// A panicking test poisons the lock; later tests still run.
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    run()
}

pub(crate) fn set_env_var(key: &str, value: &str) {
    // SAFETY: callers hold `with_locked_env`, so no other test thread
    // reads or writes the environment concurrently.
    unsafe {
        std::env::set_var(key, value);
    }
}

pub(crate) fn remove_env_var(key: &str) {
    // SAFETY: see `set_env_var`.
    unsafe {
        std::env::remove_var(key);
    }
}

/// Launcher that runs `sleep` in place of a browser.
#[cfg(unix)]
pub(crate) struct SleepingBrowser;

#[cfg(unix)]
impl tools::browser::BrowserLauncher for SleepingBrowser {
    fn locate(&self) -> Result<std::path::PathBuf, proto::error::BrowserError> {
        Ok(std::path::PathBuf::from("sleep"))
    }

    fn spawn(
        &self,
        executable: &std::path::Path,
        _args: &[String],
    ) -> Result<tokio::process::Child, proto::error::BrowserError> {
        tokio::process::Command::new(executable)
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| proto::error::BrowserError::Spawn(e.to_string()))
    }
}

/// Serves `/json/version` on a loopback port and returns the port.
#[cfg(unix)]
pub(crate) async fn devtools_stub() -> u16 {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = format!(
                    r#"{{"webSocketDebuggerUrl":"ws://127.0.0.1:{port}/devtools/browser/stub"}}"#
                );
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}
