use std::path::PathBuf;
use std::time::Duration;

use argus_core::error::AppError;
use argus_core::traits::{ElementSnapshot, PageClient};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const HIDE_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";
const WAIT_POLL: Duration = Duration::from_millis(250);

/// Launch options for [`ChromiumPage`].
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub user_agent: String,
    /// Directory for diagnostic screenshots; `None` disables them.
    pub screenshot_dir: Option<PathBuf>,
    /// Bound on a single navigation.
    pub navigation_timeout: Duration,
    pub window_size: (u32, u32),
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            screenshot_dir: None,
            navigation_timeout: Duration::from_secs(30),
            window_size: (1920, 1080),
        }
    }
}

/// One Chromium tab driven over the Chrome DevTools Protocol.
///
/// The session is hardened against trivial automation checks at launch:
/// a desktop user agent, the `AutomationControlled` blink feature off, and
/// `navigator.webdriver` hidden on every new document.
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    options: BrowserOptions,
}

impl ChromiumPage {
    pub async fn launch(options: BrowserOptions) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        let (width, height) = options.window_size;
        let config = builder
            .window_size(width, height)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg(format!("--user-agent={}", options.user_agent))
            .build()
            .map_err(|e| AppError::Generic(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::PageError(format!("Failed to open tab: {e}")))?;
        page.set_user_agent(options.user_agent.as_str())
            .await
            .map_err(|e| AppError::PageError(format!("Failed to set user agent: {e}")))?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(HIDE_WEBDRIVER))
            .await
            .map_err(|e| AppError::PageError(format!("Failed to install init script: {e}")))?;

        if let Some(dir) = &options.screenshot_dir {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::ConfigError(format!("Cannot create {}: {e}", dir.display()))
            })?;
        }

        tracing::info!(headless = options.headless, "Browser session started");
        Ok(Self {
            browser,
            page,
            handler,
            options,
        })
    }

    /// Closes the browser and stops the CDP handler.
    pub async fn close(mut self) -> Result<(), AppError> {
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| AppError::Generic(format!("Failed to close browser: {e}")));
        self.handler.abort();
        result
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// The snap wrapper at `/snap/bin/chromium` strips unknown CLI flags, so
    /// the binary inside the snap is preferred. `CHROME_BIN` overrides all.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    async fn eval(&self, script: String) -> Result<serde_json::Value, AppError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| AppError::PageError(format!("Script failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

fn first_present_script(selectors: &[&str]) -> Result<String, AppError> {
    let selectors = serde_json::to_string(selectors)?;
    Ok(format!(
        r#"(function(sels) {{
    for (var i = 0; i < sels.length; i++) {{
        try {{ if (document.querySelector(sels[i])) return i; }} catch (e) {{}}
    }}
    return -1;
}})({selectors})"#
    ))
}

fn snapshot_script(selector: &str) -> Result<String, AppError> {
    let selector = serde_json::to_string(selector)?;
    Ok(format!(
        r#"(function(sel) {{
    var el = document.querySelector(sel);
    if (!el) return null;
    var attributes = {{}};
    for (var i = 0; i < el.attributes.length; i++) {{
        attributes[el.attributes[i].name] = el.attributes[i].value;
    }}
    return {{ text: (el.innerText || el.textContent || '').trim(), attributes: attributes }};
}})({selector})"#
    ))
}

impl PageClient for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let timeout = self.options.navigation_timeout;
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::PageError(format!(
                "Failed to navigate to {url}: {e}"
            ))),
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    async fn wait_for_any(&self, selectors: &[&str], timeout: Duration) -> Result<usize, AppError> {
        let script = first_present_script(selectors)?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Evaluation fails transiently while a navigation swaps documents.
            match self.eval(script.clone()).await {
                Ok(value) => {
                    if let Some(index) = value.as_i64().filter(|i| *i >= 0) {
                        return Ok(index as usize);
                    }
                }
                Err(e) => tracing::trace!(error = %e, "Readiness probe failed"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::Timeout(timeout.as_secs()));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn find(&self, selector: &str) -> Result<Option<ElementSnapshot>, AppError> {
        let value = self.eval(snapshot_script(selector)?).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| AppError::ElementNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| AppError::PageError(format!("Click on {selector} failed: {e}")))?;
        Ok(())
    }

    async fn click_in_frame(&self, frame_selector: &str, x: f64, y: f64) -> Result<(), AppError> {
        let frame = self
            .page
            .find_element(frame_selector)
            .await
            .map_err(|_| AppError::ElementNotFound(frame_selector.to_string()))?;
        let bounds = frame
            .bounding_box()
            .await
            .map_err(|e| AppError::PageError(format!("Frame {frame_selector} not laid out: {e}")))?;
        // Mouse events at page coordinates land in the frame under the cursor.
        self.page
            .click(Point {
                x: bounds.x + x,
                y: bounds.y + y,
            })
            .await
            .map_err(|e| AppError::PageError(format!("Click in {frame_selector} failed: {e}")))?;
        Ok(())
    }

    async fn execute(&self, script: &str) -> Result<serde_json::Value, AppError> {
        self.eval(script.to_string()).await
    }

    async fn current_url(&self) -> Result<String, AppError> {
        self.page
            .url()
            .await
            .map_err(|e| AppError::PageError(format!("Failed to read URL: {e}")))?
            .ok_or_else(|| AppError::PageError("page has no URL".into()))
    }

    async fn page_source(&self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| AppError::PageError(format!("Failed to read page content: {e}")))
    }

    async fn screenshot(&self, name: &str) -> Result<(), AppError> {
        let Some(dir) = &self.options.screenshot_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{name}.png"));
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), &path)
            .await
            .map_err(|e| {
                AppError::PageError(format!("Screenshot {} failed: {e}", path.display()))
            })?;
        tracing::debug!(path = %path.display(), "Screenshot saved");
        Ok(())
    }
}
