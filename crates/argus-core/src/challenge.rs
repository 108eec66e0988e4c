//! Recovery from the registry's anti-automation challenge.
//!
//! The handler walks a fixed sequence of states, capturing a diagnostic
//! screenshot at every transition:
//!
//! ```text
//! None -> Detected -> Acknowledging -> Solving -> Submitting -> Cleared
//!                          |              |            |
//!                          +--------------+------------+--> Failed
//! ```
//!
//! `Failed` is reported to the caller as [`AppError::ChallengeFailed`]; it
//! costs the caller one visit or one listing page, never the batch.

use std::fmt;

use chrono::Utc;
use tokio::time::{Instant, sleep};

use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::site;
use crate::traits::{ChallengeSolver, PageClient, TaskStatus};

/// Progress of one challenge resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    None,
    Detected,
    Acknowledging,
    Solving,
    Submitting,
    Cleared,
    Failed,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeState::None => "none",
            ChallengeState::Detected => "detected",
            ChallengeState::Acknowledging => "acknowledging",
            ChallengeState::Solving => "solving",
            ChallengeState::Submitting => "submitting",
            ChallengeState::Cleared => "cleared",
            ChallengeState::Failed => "failed",
        }
    }
}

impl fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the current document shows the challenge frame.
pub async fn challenge_present<P: PageClient>(page: &P) -> Result<bool, AppError> {
    Ok(page.find(site::CHALLENGE_FRAME).await?.is_some())
}

/// Captures a screenshot named `<label>_<timestamp>`; failures are logged only.
pub async fn capture<P: PageClient>(page: &P, label: &str) {
    let name = format!("{label}_{}", Utc::now().format("%Y%m%d_%H%M%S_%3f"));
    if let Err(e) = page.screenshot(&name).await {
        tracing::warn!(%name, error = %e, "Screenshot failed");
    }
}

/// Drives one challenge from detection to cleared or failed.
pub struct ChallengeHandler<'a, P, S> {
    page: &'a P,
    solver: &'a S,
    config: &'a HarvestConfig,
    state: ChallengeState,
}

impl<'a, P, S> ChallengeHandler<'a, P, S>
where
    P: PageClient,
    S: ChallengeSolver,
{
    pub fn new(page: &'a P, solver: &'a S, config: &'a HarvestConfig) -> Self {
        Self {
            page,
            solver,
            config,
            state: ChallengeState::None,
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    /// Clears the challenge shown on the current page.
    ///
    /// On success the page has been resubmitted and given time to settle;
    /// the caller re-checks for content.
    pub async fn resolve(&mut self) -> Result<(), AppError> {
        self.transition(ChallengeState::Detected).await;

        match self.drive().await {
            Ok(()) => {
                self.transition(ChallengeState::Cleared).await;
                sleep(self.config.settle_delay).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Challenge resolution failed");
                self.transition(ChallengeState::Failed).await;
                Err(match e {
                    AppError::ChallengeFailed(_) => e,
                    other => AppError::ChallengeFailed(other.to_string()),
                })
            }
        }
    }

    async fn drive(&mut self) -> Result<(), AppError> {
        self.transition(ChallengeState::Acknowledging).await;
        self.acknowledge().await?;

        self.transition(ChallengeState::Solving).await;
        let token = self.solve().await?;

        self.transition(ChallengeState::Submitting).await;
        self.submit(&token).await
    }

    async fn acknowledge(&self) -> Result<(), AppError> {
        self.page
            .wait_for_any(&[site::CHALLENGE_FRAME], self.config.ready_timeout)
            .await?;
        let (x, y) = site::CHALLENGE_CHECKBOX_OFFSET;
        self.page
            .click_in_frame(site::CHALLENGE_FRAME, x, y)
            .await?;
        sleep(self.config.settle_delay).await;
        Ok(())
    }

    async fn solve(&self) -> Result<String, AppError> {
        let site_key = self
            .page
            .find(site::CHALLENGE_SITE_KEY)
            .await?
            .and_then(|el| el.attr("data-sitekey").map(str::to_string))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::ElementNotFound(site::CHALLENGE_SITE_KEY.to_string()))?;
        let page_url = self.page.current_url().await?;

        let task = self.solver.create_task(&site_key, &page_url).await?;
        tracing::info!(task_id = %task.0, %page_url, "Challenge task created");

        let deadline = Instant::now() + self.config.solver_timeout;
        loop {
            sleep(self.config.solver_poll_interval).await;

            match self.solver.poll_task(&task).await {
                Ok(TaskStatus::Ready { token }) => {
                    tracing::info!(task_id = %task.0, "Challenge token received");
                    return Ok(token);
                }
                Ok(TaskStatus::Error { code, description }) => {
                    return Err(AppError::SolverError { code, description });
                }
                Ok(TaskStatus::Pending) => {
                    tracing::debug!(task_id = %task.0, "Challenge task pending");
                }
                Err(e) => {
                    tracing::warn!(task_id = %task.0, error = %e, "Polling challenge task failed");
                }
            }

            if Instant::now() >= deadline {
                return Err(AppError::Timeout(self.config.solver_timeout.as_secs()));
            }
        }
    }

    async fn submit(&self, token: &str) -> Result<(), AppError> {
        let script = inject_token_script(token)?;
        self.page.execute(&script).await?;
        sleep(self.config.settle_delay).await;

        self.page
            .wait_for_any(&[site::CHALLENGE_SUBMIT], self.config.ready_timeout)
            .await?;
        self.page.click(site::CHALLENGE_SUBMIT).await
    }

    async fn transition(&mut self, next: ChallengeState) {
        tracing::info!(from = %self.state, to = %next, "Challenge state change");
        self.state = next;
        capture(self.page, &format!("challenge_{next}")).await;
    }
}

fn inject_token_script(token: &str) -> Result<String, AppError> {
    let token = serde_json::to_string(token)?;
    let field = site::CHALLENGE_RESPONSE_FIELD;
    Ok(format!(
        r#"(function(token) {{
    var field = document.getElementById('{field}');
    if (!field) {{
        field = document.createElement('input');
        field.type = 'hidden';
        field.id = '{field}';
        field.name = '{field}';
        (document.querySelector('form') || document.body).appendChild(field);
    }}
    field.value = token;
    field.innerHTML = token;
    return true;
}})({token});"#
    ))
}
