use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::CompanyRecord;

/// Text and attributes of a DOM element, copied out of the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementSnapshot {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// One exclusive browser session.
///
/// Callers await every operation before issuing the next one; the session
/// never serves two navigations at once.
pub trait PageClient: Send + Sync {
    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Waits until any of `selectors` matches and returns the index of the
    /// first matching one. Fails with [`AppError::Timeout`] when none
    /// appears within `timeout`.
    fn wait_for_any(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    fn find(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Option<ElementSnapshot>, AppError>> + Send;

    fn click(&self, selector: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Clicks at an offset inside an embedded frame, then returns focus to
    /// the main document.
    fn click_in_frame(
        &self,
        frame_selector: &str,
        x: f64,
        y: f64,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn execute(
        &self,
        script: &str,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    fn page_source(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    fn screenshot(&self, name: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Identifier of a task submitted to the challenge solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId(pub String);

/// Status of a solver task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Ready { token: String },
    Error { code: i64, description: String },
}

/// Third-party service that solves interactive challenges.
pub trait ChallengeSolver: Send + Sync + Clone {
    fn create_task(
        &self,
        site_key: &str,
        page_url: &str,
    ) -> impl Future<Output = Result<TaskId, AppError>> + Send;

    fn poll_task(&self, task: &TaskId) -> impl Future<Output = Result<TaskStatus, AppError>> + Send;
}

/// Durable storage of company records, one target per batch month.
pub trait RecordStore: Send + Sync + Clone {
    /// Existing records of `target`, in stored order. A missing target is empty.
    fn load(
        &self,
        target: &str,
    ) -> impl Future<Output = Result<Vec<CompanyRecord>, AppError>> + Send;

    /// Merges `new_records` into `existing` by tax ID (later record wins)
    /// and writes the result back in full. Returns how many of
    /// `new_records` were written.
    fn merge_and_save(
        &self,
        target: &str,
        existing: Vec<CompanyRecord>,
        new_records: &[CompanyRecord],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;
}
