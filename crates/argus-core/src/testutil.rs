//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scraper::{Html, Selector};

use crate::batch::{BatchEvent, BatchReporter};
use crate::error::AppError;
use crate::extract::clean_text;
use crate::models::{CompanyRecord, merge_records};
use crate::traits::{
    ChallengeSolver, ElementSnapshot, PageClient, RecordStore, TaskId, TaskStatus,
};

const BLANK_PAGE: &str = "<html><head></head><body></body></html>";

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PageState {
    pages: HashMap<String, String>,
    on_click: HashMap<String, String>,
    script_results: Vec<(String, serde_json::Value)>,
    failing_urls: Vec<String>,
    current_url: String,
    current_html: String,
    navigations: Vec<String>,
    scripts: Vec<String>,
    clicks: Vec<String>,
    frame_clicks: Vec<String>,
    screenshots: Vec<String>,
    source_failures: u32,
    fail_screenshots: bool,
}

/// Scripted browser session over a map of URL to HTML.
///
/// `wait_for_any` and `find` evaluate selectors against the HTML of the
/// current page; waits that never match sleep out their full timeout, so
/// tests under paused time observe realistic elapsed durations.
#[derive(Clone, Default)]
pub struct MockPage {
    state: Arc<Mutex<PageState>>,
}

impl MockPage {
    pub fn new() -> Self {
        let page = Self::default();
        page.state.lock().unwrap().current_html = BLANK_PAGE.to_string();
        page
    }

    /// Session already showing `html` at `url`, without a recorded navigation.
    pub fn showing(url: &str, html: &str) -> Self {
        let page = Self::new().with_page(url, html);
        {
            let mut state = page.state.lock().unwrap();
            state.current_url = url.to_string();
            state.current_html = html.to_string();
        }
        page
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
        self
    }

    /// Clicking `selector` replaces the current document with `html`.
    pub fn with_click_result(self, selector: &str, html: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .on_click
            .insert(selector.to_string(), html.to_string());
        self
    }

    /// Scripts containing `needle` evaluate to `value`; others to `null`.
    pub fn with_script_result(self, needle: &str, value: serde_json::Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .script_results
            .push((needle.to_string(), value));
        self
    }

    /// The next `count` calls to `page_source` fail with a transient error.
    pub fn fail_page_source(self, count: u32) -> Self {
        self.state.lock().unwrap().source_failures = count;
        self
    }

    pub fn fail_navigation(self, url: &str) -> Self {
        self.state.lock().unwrap().failing_urls.push(url.to_string());
        self
    }

    pub fn fail_screenshots(self) -> Self {
        self.state.lock().unwrap().fail_screenshots = true;
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn frame_clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().frame_clicks.clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.state.lock().unwrap().screenshots.clone()
    }

    fn current_html(&self) -> String {
        self.state.lock().unwrap().current_html.clone()
    }
}

fn compile(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector).map_err(|e| AppError::SelectorError {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn first_match(html: &str, selectors: &[&str]) -> Result<Option<usize>, AppError> {
    let doc = Html::parse_document(html);
    for (index, selector) in selectors.iter().enumerate() {
        if doc.select(&compile(selector)?).next().is_some() {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn snapshot(html: &str, selector: &str) -> Result<Option<ElementSnapshot>, AppError> {
    let doc = Html::parse_document(html);
    let sel = compile(selector)?;
    Ok(doc.select(&sel).next().map(|el| ElementSnapshot {
        text: clean_text(el),
        attributes: el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }))
}

impl PageClient for MockPage {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        if state.failing_urls.iter().any(|u| u == url) {
            return Err(AppError::PageError(format!("net::ERR_CONNECTION_RESET at {url}")));
        }
        state.current_url = url.to_string();
        state.current_html = state
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| BLANK_PAGE.to_string());
        Ok(())
    }

    async fn wait_for_any(&self, selectors: &[&str], timeout: Duration) -> Result<usize, AppError> {
        if let Some(index) = first_match(&self.current_html(), selectors)? {
            return Ok(index);
        }
        tokio::time::sleep(timeout).await;
        Err(AppError::Timeout(timeout.as_secs()))
    }

    async fn find(&self, selector: &str) -> Result<Option<ElementSnapshot>, AppError> {
        snapshot(&self.current_html(), selector)
    }

    async fn click(&self, selector: &str) -> Result<(), AppError> {
        if first_match(&self.current_html(), &[selector])?.is_none() {
            return Err(AppError::ElementNotFound(selector.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.clicks.push(selector.to_string());
        if let Some(html) = state.on_click.get(selector).cloned() {
            state.current_html = html;
        }
        Ok(())
    }

    async fn click_in_frame(&self, frame_selector: &str, _x: f64, _y: f64) -> Result<(), AppError> {
        if first_match(&self.current_html(), &[frame_selector])?.is_none() {
            return Err(AppError::ElementNotFound(frame_selector.to_string()));
        }
        self.state
            .lock()
            .unwrap()
            .frame_clicks
            .push(frame_selector.to_string());
        Ok(())
    }

    async fn execute(&self, script: &str) -> Result<serde_json::Value, AppError> {
        let mut state = self.state.lock().unwrap();
        state.scripts.push(script.to_string());
        Ok(state
            .script_results
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(serde_json::Value::Null))
    }

    async fn current_url(&self) -> Result<String, AppError> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn page_source(&self) -> Result<String, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.source_failures > 0 {
            state.source_failures -= 1;
            return Err(AppError::PageError("document not ready".into()));
        }
        Ok(state.current_html.clone())
    }

    async fn screenshot(&self, name: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_screenshots {
            return Err(AppError::PageError("screenshot failed".into()));
        }
        state.screenshots.push(name.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSolver
// ---------------------------------------------------------------------------

/// Mock solver returning a queue of poll statuses.
///
/// Once the queue is drained every poll reports `Pending`.
#[derive(Clone)]
pub struct MockSolver {
    create_error: Arc<Mutex<Option<AppError>>>,
    statuses: Arc<Mutex<Vec<Result<TaskStatus, AppError>>>>,
    pub created: Arc<Mutex<Vec<(String, String)>>>,
    pub polls: Arc<Mutex<u32>>,
}

impl MockSolver {
    pub fn with_statuses(statuses: Vec<Result<TaskStatus, AppError>>) -> Self {
        Self {
            create_error: Arc::new(Mutex::new(None)),
            statuses: Arc::new(Mutex::new(statuses)),
            created: Arc::new(Mutex::new(Vec::new())),
            polls: Arc::new(Mutex::new(0)),
        }
    }

    /// Solver that yields `token` on the first poll.
    pub fn ready(token: &str) -> Self {
        Self::with_statuses(vec![Ok(TaskStatus::Ready {
            token: token.to_string(),
        })])
    }

    /// Solver whose tasks never complete.
    pub fn never_ready() -> Self {
        Self::with_statuses(Vec::new())
    }

    pub fn with_create_error(error: AppError) -> Self {
        let solver = Self::never_ready();
        *solver.create_error.lock().unwrap() = Some(error);
        solver
    }

    pub fn poll_count(&self) -> u32 {
        *self.polls.lock().unwrap()
    }
}

impl ChallengeSolver for MockSolver {
    async fn create_task(&self, site_key: &str, page_url: &str) -> Result<TaskId, AppError> {
        if let Some(e) = self.create_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut created = self.created.lock().unwrap();
        created.push((site_key.to_string(), page_url.to_string()));
        Ok(TaskId(format!("task-{}", created.len())))
    }

    async fn poll_task(&self, _task: &TaskId) -> Result<TaskStatus, AppError> {
        *self.polls.lock().unwrap() += 1;
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.is_empty() {
            Ok(TaskStatus::Pending)
        } else {
            statuses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory record store keyed by target.
#[derive(Clone, Default)]
pub struct MockStore {
    pub targets: Arc<Mutex<HashMap<String, Vec<CompanyRecord>>>>,
    /// Number of new records handed to each `merge_and_save` call.
    pub flushes: Arc<Mutex<Vec<usize>>>,
    pub loads: Arc<Mutex<u32>>,
    save_error: Arc<Mutex<Option<AppError>>>,
}

impl MockStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_records(target: &str, records: Vec<CompanyRecord>) -> Self {
        let store = Self::default();
        store
            .targets
            .lock()
            .unwrap()
            .insert(target.to_string(), records);
        store
    }

    /// Store whose next save fails.
    pub fn with_save_error(error: AppError) -> Self {
        let store = Self::default();
        *store.save_error.lock().unwrap() = Some(error);
        store
    }

    pub fn records(&self, target: &str) -> Vec<CompanyRecord> {
        self.targets
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    pub fn flush_sizes(&self) -> Vec<usize> {
        self.flushes.lock().unwrap().clone()
    }
}

impl RecordStore for MockStore {
    async fn load(&self, target: &str) -> Result<Vec<CompanyRecord>, AppError> {
        *self.loads.lock().unwrap() += 1;
        Ok(self.records(target))
    }

    async fn merge_and_save(
        &self,
        target: &str,
        existing: Vec<CompanyRecord>,
        new_records: &[CompanyRecord],
    ) -> Result<usize, AppError> {
        if let Some(e) = self.save_error.lock().unwrap().take() {
            return Err(e);
        }
        self.flushes.lock().unwrap().push(new_records.len());
        let outcome = merge_records(existing, new_records);
        self.targets
            .lock()
            .unwrap()
            .insert(target.to_string(), outcome.records);
        Ok(outcome.added + outcome.replaced)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records event kinds and retry backoffs.
#[derive(Clone, Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<&'static str>>>,
    pub backoffs: Arc<Mutex<Vec<Duration>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn backoffs(&self) -> Vec<Duration> {
        self.backoffs.lock().unwrap().clone()
    }
}

impl BatchReporter for MockReporter {
    fn report(&self, event: BatchEvent<'_>) {
        if let BatchEvent::RetryScheduled { backoff, .. } = &event {
            self.backoffs.lock().unwrap().push(*backoff);
        }
        self.events.lock().unwrap().push(event.kind());
    }
}
