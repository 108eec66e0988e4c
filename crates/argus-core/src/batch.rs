//! Month batches: filter, traverse, visit, persist, with bounded retry.

use std::time::Duration;

use tokio::time::sleep;

use crate::challenge::capture;
use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::extract::FieldExtractor;
use crate::filter::apply_date_filter;
use crate::models::{CandidateReference, CompanyRecord, DateRange, SeenTaxIds};
use crate::pacing::VisitPacer;
use crate::traits::{ChallengeSolver, PageClient, RecordStore};
use crate::traversal::PageTraversal;
use crate::visitor::{CompanyVisitor, VisitOutcome};

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    AttemptStarted {
        range: &'a DateRange,
        attempt: u32,
    },
    SeenLoaded {
        target: &'a str,
        count: usize,
    },
    FilterApplied {
        range: &'a DateRange,
    },
    CandidatesCollected {
        count: usize,
    },
    CompanyVisited {
        reference: &'a CandidateReference,
        outcome: &'a VisitOutcome,
    },
    Flushed {
        target: &'a str,
        staged: usize,
        written: usize,
    },
    AttemptFailed {
        range: &'a DateRange,
        attempt: u32,
        error: &'a str,
    },
    RetryScheduled {
        range: &'a DateRange,
        attempt: u32,
        backoff: Duration,
    },
    BatchSucceeded {
        range: &'a DateRange,
        persisted: usize,
    },
    BatchFailed {
        range: &'a DateRange,
        attempts: u32,
        error: &'a str,
    },
}

impl BatchEvent<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            BatchEvent::AttemptStarted { .. } => "attempt_started",
            BatchEvent::SeenLoaded { .. } => "seen_loaded",
            BatchEvent::FilterApplied { .. } => "filter_applied",
            BatchEvent::CandidatesCollected { .. } => "candidates_collected",
            BatchEvent::CompanyVisited { .. } => "company_visited",
            BatchEvent::Flushed { .. } => "flushed",
            BatchEvent::AttemptFailed { .. } => "attempt_failed",
            BatchEvent::RetryScheduled { .. } => "retry_scheduled",
            BatchEvent::BatchSucceeded { .. } => "batch_succeeded",
            BatchEvent::BatchFailed { .. } => "batch_failed",
        }
    }
}

/// Trait for receiving batch events (decoupled logging).
pub trait BatchReporter: Send + Sync {
    fn report(&self, event: BatchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBatchReporter;

impl BatchReporter for TracingBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::AttemptStarted { range, attempt } => {
                tracing::info!(%range, attempt, "Batch attempt started");
            }
            BatchEvent::SeenLoaded { target, count } => {
                tracing::info!(%target, count, "Loaded stored tax IDs");
            }
            BatchEvent::FilterApplied { range } => {
                tracing::debug!(%range, "Filter applied");
            }
            BatchEvent::CandidatesCollected { count } => {
                tracing::info!(count, "Candidates collected");
            }
            BatchEvent::CompanyVisited { reference, outcome } => match outcome {
                VisitOutcome::Accepted(record) => {
                    tracing::info!(url = %reference, tax_id = %record.tax_id, "Company accepted");
                }
                VisitOutcome::Failed(error) => {
                    tracing::warn!(url = %reference, %error, "Company skipped");
                }
                other => {
                    tracing::debug!(url = %reference, outcome = other.kind(), "Company skipped");
                }
            },
            BatchEvent::Flushed {
                target,
                staged,
                written,
            } => {
                tracing::info!(%target, staged, written, "Records flushed");
            }
            BatchEvent::AttemptFailed {
                range,
                attempt,
                error,
            } => {
                tracing::warn!(%range, attempt, %error, "Batch attempt failed");
            }
            BatchEvent::RetryScheduled {
                range,
                attempt,
                backoff,
            } => {
                tracing::info!(%range, attempt, backoff_secs = backoff.as_secs(), "Retrying batch");
            }
            BatchEvent::BatchSucceeded { range, persisted } => {
                tracing::info!(%range, persisted, "Batch finished");
            }
            BatchEvent::BatchFailed {
                range,
                attempts,
                error,
            } => {
                tracing::error!(%range, attempts, %error, "Batch failed");
            }
        }
    }
}

/// Result of a successful batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub range: DateRange,
    /// Records written to the store across all attempts.
    pub persisted: usize,
    /// Candidates visited by the successful attempt.
    pub visited: usize,
    pub attempts: u32,
}

/// Totals of a multi-month run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: Vec<DateRange>,
    /// Failed batches with their final error.
    pub failed: Vec<(DateRange, String)>,
    pub persisted: usize,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives month batches over one browser session.
pub struct BatchOrchestrator<P, S, R>
where
    P: PageClient,
    S: ChallengeSolver,
    R: RecordStore,
{
    page: P,
    solver: S,
    store: R,
    config: HarvestConfig,
    extractor: FieldExtractor,
    pacer: VisitPacer,
}

impl<P, S, R> BatchOrchestrator<P, S, R>
where
    P: PageClient,
    S: ChallengeSolver,
    R: RecordStore,
{
    pub fn new(page: P, solver: S, store: R, config: HarvestConfig) -> Self {
        let pacer = VisitPacer::from_config(&config);
        Self {
            page,
            solver,
            store,
            config,
            extractor: FieldExtractor::default(),
            pacer,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Gives the page back, e.g. to close the browser after a run.
    pub fn into_page(self) -> P {
        self.page
    }

    /// Runs every month in order; a failed batch does not stop the run.
    pub async fn run<BR: BatchReporter>(
        &self,
        months: &[DateRange],
        reporter: &BR,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for range in months {
            match self.run_batch(range, reporter).await {
                Ok(outcome) => {
                    summary.persisted += outcome.persisted;
                    summary.succeeded.push(*range);
                }
                Err(e) => summary.failed.push((*range, e.to_string())),
            }
        }
        tracing::info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            persisted = summary.persisted,
            "Run finished"
        );
        summary
    }

    /// Harvests one month, retrying the whole batch on failure.
    ///
    /// Attempt `n` that fails waits `n * retry_backoff` before the next
    /// one; nothing is waited after the last attempt.
    pub async fn run_batch<BR: BatchReporter>(
        &self,
        range: &DateRange,
        reporter: &BR,
    ) -> Result<BatchOutcome, AppError> {
        let target = range.target();
        let mut persisted = 0;
        let mut attempt = 1;

        loop {
            reporter.report(BatchEvent::AttemptStarted { range, attempt });

            match self.attempt(range, &target, &mut persisted, reporter).await {
                Ok(visited) => {
                    reporter.report(BatchEvent::BatchSucceeded { range, persisted });
                    return Ok(BatchOutcome {
                        range: *range,
                        persisted,
                        visited,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    reporter.report(BatchEvent::AttemptFailed {
                        range,
                        attempt,
                        error: &error,
                    });
                    let label = format!("batch_{}_attempt_{attempt}", range.label());
                    capture(&self.page, &label).await;

                    if attempt >= self.config.max_retries {
                        reporter.report(BatchEvent::BatchFailed {
                            range,
                            attempts: attempt,
                            error: &error,
                        });
                        return Err(e);
                    }

                    let backoff = self.config.backoff_for_attempt(attempt);
                    reporter.report(BatchEvent::RetryScheduled {
                        range,
                        attempt,
                        backoff,
                    });
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt<BR: BatchReporter>(
        &self,
        range: &DateRange,
        target: &str,
        persisted: &mut usize,
        reporter: &BR,
    ) -> Result<usize, AppError> {
        // Reloaded per attempt so records flushed by a failed attempt count as seen.
        let existing = self.store.load(target).await?;
        let mut seen: SeenTaxIds = existing.into_iter().map(|r| r.tax_id).collect();
        reporter.report(BatchEvent::SeenLoaded {
            target,
            count: seen.len(),
        });

        apply_date_filter(&self.page, &self.config, range).await?;
        reporter.report(BatchEvent::FilterApplied { range });

        let candidates = PageTraversal::new(&self.page, &self.solver, &self.config)
            .collect_all()
            .await?;
        reporter.report(BatchEvent::CandidatesCollected {
            count: candidates.len(),
        });
        if candidates.is_empty() {
            return Ok(0);
        }

        let visitor = CompanyVisitor::new(&self.page, &self.solver, &self.config, &self.extractor);
        let mut staged: Vec<CompanyRecord> = Vec::new();

        for (index, reference) in candidates.iter().enumerate() {
            if index > 0 {
                self.pacer.pause().await;
            }

            let outcome = visitor.visit(reference, &seen).await;
            reporter.report(BatchEvent::CompanyVisited {
                reference,
                outcome: &outcome,
            });
            if let Some(record) = outcome.into_record() {
                seen.insert(record.tax_id.clone());
                staged.push(record);
            }

            if (index + 1) % self.config.flush_every == 0 && !staged.is_empty() {
                *persisted += self.flush(target, &mut staged, reporter).await?;
            }
        }

        if !staged.is_empty() {
            *persisted += self.flush(target, &mut staged, reporter).await?;
        }
        Ok(candidates.len())
    }

    async fn flush<BR: BatchReporter>(
        &self,
        target: &str,
        staged: &mut Vec<CompanyRecord>,
        reporter: &BR,
    ) -> Result<usize, AppError> {
        let existing = self.store.load(target).await?;
        let written = self.store.merge_and_save(target, existing, staged).await?;
        reporter.report(BatchEvent::Flushed {
            target,
            staged: staged.len(),
            written,
        });
        staged.clear();
        Ok(written)
    }
}
