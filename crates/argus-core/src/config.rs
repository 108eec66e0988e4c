use std::time::Duration;

use url::Url;

use crate::error::AppError;

pub const DEFAULT_SEARCH_URL: &str = "https://checko.ru/search/advanced";

/// Runtime settings shared by every pipeline component.
///
/// Built once at startup and passed by reference; nothing in the pipeline
/// reads global state.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Advanced-search page where the date filter is applied.
    pub search_url: Url,
    /// Bound on the first readiness wait after navigating.
    pub page_load_timeout: Duration,
    /// Bound on follow-up waits (tax ID after a challenge, filter controls).
    pub ready_timeout: Duration,
    /// Pause that lets asynchronous rendering finish before inspection.
    pub settle_delay: Duration,
    /// First listing page to read.
    pub start_page: u32,
    /// Last listing page to read (safety cap).
    pub max_page: u32,
    /// Attempts of the filter routine before giving up on the batch attempt.
    pub filter_attempts: u32,
    /// Attempts per batch.
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `n * retry_backoff` after failing.
    pub retry_backoff: Duration,
    pub solver_poll_interval: Duration,
    pub solver_timeout: Duration,
    /// Visits between two flushes of staged records.
    pub flush_every: usize,
    pub visit_delay_min: Duration,
    pub visit_delay_max: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            search_url: Url::parse(DEFAULT_SEARCH_URL).expect("default search URL is valid"),
            page_load_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(20),
            settle_delay: Duration::from_secs(2),
            start_page: 1,
            max_page: 560,
            filter_attempts: 3,
            max_retries: 3,
            retry_backoff: Duration::from_secs(10),
            solver_poll_interval: Duration::from_secs(10),
            solver_timeout: Duration::from_secs(300),
            flush_every: 10,
            visit_delay_min: Duration::from_secs(1),
            visit_delay_max: Duration::from_secs(3),
        }
    }
}

impl HarvestConfig {
    pub fn with_search_url(mut self, url: &str) -> Result<Self, AppError> {
        self.search_url = Url::parse(url)
            .map_err(|e| AppError::ConfigError(format!("Invalid search URL '{url}': {e}")))?;
        Ok(self)
    }

    pub fn with_pages(mut self, start_page: u32, max_page: u32) -> Result<Self, AppError> {
        if start_page == 0 || max_page < start_page {
            return Err(AppError::ConfigError(format!(
                "Invalid page window {start_page}..={max_page}"
            )));
        }
        self.start_page = start_page;
        self.max_page = max_page;
        Ok(self)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Result<Self, AppError> {
        if max_retries == 0 {
            return Err(AppError::ConfigError("max retries must be at least 1".into()));
        }
        self.max_retries = max_retries;
        Ok(self)
    }

    pub fn with_flush_every(mut self, flush_every: usize) -> Result<Self, AppError> {
        if flush_every == 0 {
            return Err(AppError::ConfigError("flush interval must be at least 1".into()));
        }
        self.flush_every = flush_every;
        Ok(self)
    }

    pub fn with_visit_delay(mut self, min: Duration, max: Duration) -> Self {
        self.visit_delay_min = min;
        self.visit_delay_max = max.max(min);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_timeouts(mut self, page_load: Duration, ready: Duration) -> Self {
        self.page_load_timeout = page_load;
        self.ready_timeout = ready;
        self
    }

    pub fn with_solver_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.solver_poll_interval = poll_interval;
        self.solver_timeout = timeout;
        self
    }

    /// Scheme and host of the registry, used to resolve relative links.
    pub fn origin(&self) -> Url {
        let mut origin = self.search_url.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        origin
    }

    /// Listing URL for a result page under the active filter.
    pub fn listing_url(&self, page: u32) -> String {
        let mut url = self.search_url.clone();
        url.query_pairs_mut().clear().append_pair("page", &page.to_string());
        url.to_string()
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_backoff * attempt
    }
}
