//! DevTools connection to the supervised browser and page operations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::actions::{PageAction, ScrollDirection};
use super::dom::{self, EXTRACT_JS, OBSERVE_JS, ObservedElement};
use super::screenshot;
use super::supervisor::BrowserSupervisor;

const HISTORY_SETTLE: Duration = Duration::from_millis(500);

struct Connection {
    generation: u64,
    _browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Page-level access to the browser owned by a [`BrowserSupervisor`].
///
/// Keeps a single page. The connection is re-established whenever the
/// supervisor reports a new launch generation.
pub struct BrowserSession {
    supervisor: Arc<BrowserSupervisor>,
    downloads_dir: PathBuf,
    screenshots_dir: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl BrowserSession {
    pub fn new(
        supervisor: Arc<BrowserSupervisor>,
        downloads_dir: impl Into<PathBuf>,
        screenshots_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            supervisor,
            downloads_dir: downloads_dir.into(),
            screenshots_dir: screenshots_dir.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn supervisor(&self) -> &Arc<BrowserSupervisor> {
        &self.supervisor
    }

    /// Releases the page connection and the browser process.
    pub async fn close(&self) -> bool {
        self.conn.lock().await.take();
        self.supervisor.close().await
    }

    async fn page(&self) -> Result<Page, String> {
        let endpoint = self
            .supervisor
            .ensure_ready()
            .await
            .map_err(|e| e.to_string())?;

        let mut conn = self.conn.lock().await;
        if let Some(existing) = conn.as_ref() {
            if existing.generation == endpoint.generation {
                return Ok(existing.page.clone());
            }
        }

        debug!(ws_url = %endpoint.ws_url, "Connecting to browser");
        let (browser, mut handler) = Browser::connect(endpoint.ws_url.clone())
            .await
            .map_err(|e| format!("Failed to connect to browser: {e}"))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        self.allow_downloads(&browser).await;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("Failed to create page: {e}"))?;
        info!(generation = endpoint.generation, "Browser page attached");

        *conn = Some(Connection {
            generation: endpoint.generation,
            _browser: browser,
            page: page.clone(),
            handler_task,
        });
        Ok(page)
    }

    async fn allow_downloads(&self, browser: &Browser) {
        let params = match SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(self.downloads_dir.display().to_string())
            .build()
        {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "Invalid download behavior params");
                return;
            }
        };
        if let Err(e) = browser.execute(params).await {
            warn!(error = %e, "Failed to set download directory");
        }
    }

    /// Loads `url` and reports where the page ended up.
    pub async fn navigate(&self, url: &str) -> Result<Value, String> {
        let page = self.page().await?;
        page.goto(url)
            .await
            .map_err(|e| format!("Navigation failed: {e}"))?;
        let (final_url, title) = page_location(&page).await?;
        Ok(json!({
            "action": "navigate",
            "requested_url": url,
            "final_url": final_url,
            "title": title,
        }))
    }

    /// Runs one parsed page action.
    pub async fn perform(&self, action: &PageAction) -> Result<Value, String> {
        let page = self.page().await?;
        let summary = match action {
            PageAction::Click { selector } => {
                page.find_element(selector.as_str())
                    .await
                    .map_err(|e| format!("Element '{selector}' not found: {e}"))?
                    .click()
                    .await
                    .map_err(|e| format!("Failed to click '{selector}': {e}"))?;
                format!("clicked {selector}")
            }
            PageAction::Type { text, selector } => {
                page.find_element(selector.as_str())
                    .await
                    .map_err(|e| format!("Element '{selector}' not found: {e}"))?
                    .click()
                    .await
                    .map_err(|e| format!("Failed to focus '{selector}': {e}"))?
                    .type_str(text)
                    .await
                    .map_err(|e| format!("Failed to type into '{selector}': {e}"))?;
                format!("typed {} chars into {selector}", text.chars().count())
            }
            PageAction::Press { key, selector } => {
                let target = match selector {
                    Some(selector) => page
                        .find_element(selector.as_str())
                        .await
                        .map_err(|e| format!("Element '{selector}' not found: {e}"))?,
                    None => match page.find_element(":focus").await {
                        Ok(el) => el,
                        Err(_) => page
                            .find_element("body")
                            .await
                            .map_err(|e| format!("No element to receive key: {e}"))?,
                    },
                };
                target
                    .press_key(key.as_str())
                    .await
                    .map_err(|e| format!("Failed to press {key}: {e}"))?;
                format!("pressed {key}")
            }
            PageAction::Scroll(direction) => {
                let sign = match direction {
                    ScrollDirection::Down => "",
                    ScrollDirection::Up => "-",
                };
                evaluate::<Value>(
                    &page,
                    &format!("window.scrollBy(0, {sign}window.innerHeight * 0.8); window.scrollY"),
                )
                .await?;
                format!("scrolled {}", if sign.is_empty() { "down" } else { "up" })
            }
            PageAction::Wait(duration) => {
                tokio::time::sleep(*duration).await;
                format!("waited {:.1}s", duration.as_secs_f64())
            }
            PageAction::Back => {
                evaluate::<Value>(&page, "window.history.back(); true").await?;
                tokio::time::sleep(HISTORY_SETTLE).await;
                "went back".to_string()
            }
            PageAction::Navigate { url } => {
                page.goto(url.as_str())
                    .await
                    .map_err(|e| format!("Navigation failed: {e}"))?;
                format!("navigated to {url}")
            }
        };

        let (final_url, title) = page_location(&page).await?;
        Ok(json!({
            "action": summary,
            "url": final_url,
            "title": title,
        }))
    }

    /// Summarizes page content for the agent to answer `instruction`.
    pub async fn extract(&self, instruction: &str, schema: Option<&Value>) -> Result<Value, String> {
        let page = self.page().await?;
        let mut content: Value = evaluate(&page, EXTRACT_JS).await?;
        if let Some(text) = content.get("text").and_then(Value::as_str) {
            let clipped = dom::clip(text.trim(), dom::MAX_TEXT_CHARS);
            content["text"] = Value::String(clipped);
        }
        content["instruction"] = Value::String(instruction.to_string());
        if let Some(schema) = schema {
            content["schema"] = schema.clone();
        }
        Ok(content)
    }

    /// Lists interactive elements relevant to `query`.
    pub async fn observe(&self, query: &str) -> Result<Value, String> {
        let page = self.page().await?;
        let elements: Vec<ObservedElement> = evaluate(&page, OBSERVE_JS).await?;
        let total = elements.len();
        let elements = dom::filter_elements(elements, query);
        let (url, _) = page_location(&page).await?;
        Ok(json!({
            "query": query,
            "url": url,
            "total_interactive": total,
            "elements": elements,
        }))
    }

    /// Captures the full page into the screenshots directory.
    pub async fn screenshot(&self) -> Result<Value, String> {
        let page = self.page().await?;
        let raw = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| format!("Failed to capture screenshot: {e}"))?;
        let processed = tokio::task::spawn_blocking(move || screenshot::fit_png(raw))
            .await
            .map_err(|e| format!("Screenshot processing panicked: {e}"))??;

        let path = screenshot::screenshot_path(&self.screenshots_dir);
        tokio::fs::create_dir_all(&self.screenshots_dir)
            .await
            .map_err(|e| format!("Failed to create screenshots dir: {e}"))?;
        tokio::fs::write(&path, &processed.png)
            .await
            .map_err(|e| format!("Failed to save screenshot: {e}"))?;
        info!(path = %path.display(), "Screenshot saved");

        Ok(json!({
            "path": path.display().to_string(),
            "width": processed.width,
            "height": processed.height,
            "resized": processed.resized,
            "size_bytes": processed.png.len(),
        }))
    }
}

async fn page_location(page: &Page) -> Result<(String, String), String> {
    let url = page
        .url()
        .await
        .map_err(|e| format!("Failed to read page URL: {e}"))?
        .unwrap_or_default();
    let title = page
        .get_title()
        .await
        .map_err(|e| format!("Failed to read page title: {e}"))?
        .unwrap_or_default();
    Ok((url, title))
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: &str) -> Result<T, String> {
    let params = EvaluateParams::builder()
        .expression(script)
        .return_by_value(true)
        .await_promise(true)
        .build()
        .map_err(|e| format!("Invalid script: {e}"))?;
    page.evaluate_expression(params)
        .await
        .map_err(|e| format!("Script evaluation failed: {e}"))?
        .into_value()
        .map_err(|e| format!("Unexpected script result: {e}"))
}
