//! One visit to a company detail page.

use crate::challenge::{ChallengeHandler, capture};
use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::extract::FieldExtractor;
use crate::models::{CandidateReference, CompanyRecord, SeenTaxIds};
use crate::site;
use crate::traits::{ChallengeSolver, PageClient};

/// Result of a visit. Everything but `Accepted` is a skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitOutcome {
    Accepted(Box<CompanyRecord>),
    /// The tax ID is already persisted or staged in this batch.
    Duplicate(String),
    /// Extracted, but carries neither phone nor email.
    Invalid(String),
    /// The page never showed a tax ID.
    NoTaxId,
    /// Navigation, challenge or page access failed.
    Failed(String),
}

impl VisitOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            VisitOutcome::Accepted(_) => "accepted",
            VisitOutcome::Duplicate(_) => "duplicate",
            VisitOutcome::Invalid(_) => "invalid",
            VisitOutcome::NoTaxId => "no_tax_id",
            VisitOutcome::Failed(_) => "failed",
        }
    }

    pub fn into_record(self) -> Option<CompanyRecord> {
        match self {
            VisitOutcome::Accepted(record) => Some(*record),
            _ => None,
        }
    }
}

/// Visits detail pages and applies the inclusion policy.
pub struct CompanyVisitor<'a, P, S> {
    page: &'a P,
    solver: &'a S,
    config: &'a HarvestConfig,
    extractor: &'a FieldExtractor,
}

impl<'a, P, S> CompanyVisitor<'a, P, S>
where
    P: PageClient,
    S: ChallengeSolver,
{
    pub fn new(
        page: &'a P,
        solver: &'a S,
        config: &'a HarvestConfig,
        extractor: &'a FieldExtractor,
    ) -> Self {
        Self {
            page,
            solver,
            config,
            extractor,
        }
    }

    /// Visits `reference`. Never fails: errors become [`VisitOutcome::Failed`].
    pub async fn visit(&self, reference: &CandidateReference, seen: &SeenTaxIds) -> VisitOutcome {
        match self.try_visit(reference, seen).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(url = %reference, error = %e, "Company visit failed");
                capture(self.page, &format!("company_{}_error", reference.slug())).await;
                VisitOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_visit(
        &self,
        reference: &CandidateReference,
        seen: &SeenTaxIds,
    ) -> Result<VisitOutcome, AppError> {
        tracing::debug!(url = %reference, "Visiting company page");
        self.page.navigate(reference.as_str()).await?;

        let shown = match self
            .page
            .wait_for_any(
                &[site::TAX_ID_ANCHOR, site::CHALLENGE_FRAME],
                self.config.page_load_timeout,
            )
            .await
        {
            Ok(index) => index,
            Err(AppError::Timeout(secs)) => {
                tracing::warn!(url = %reference, secs, "Company page never became ready");
                capture(self.page, &format!("company_{}_timeout", reference.slug())).await;
                return Ok(VisitOutcome::NoTaxId);
            }
            Err(e) => return Err(e),
        };

        if shown == 1 {
            tracing::info!(url = %reference, "Challenge on company page");
            ChallengeHandler::new(self.page, self.solver, self.config)
                .resolve()
                .await?;
        }

        if let Err(e) = self
            .page
            .wait_for_any(&[site::TAX_ID_ANCHOR], self.config.ready_timeout)
            .await
        {
            if !matches!(e, AppError::Timeout(_)) {
                return Err(e);
            }
            tracing::warn!(url = %reference, "Tax ID did not appear");
            return Ok(VisitOutcome::NoTaxId);
        }

        capture(self.page, &format!("company_{}", reference.slug())).await;
        let html = self.page.page_source().await?;

        let Some(record) = self.extractor.extract(&html, reference.as_str()) else {
            return Ok(VisitOutcome::NoTaxId);
        };
        if seen.contains(&record.tax_id) {
            tracing::debug!(tax_id = %record.tax_id, "Already collected");
            return Ok(VisitOutcome::Duplicate(record.tax_id));
        }
        if !record.is_valid_for_persistence() {
            tracing::info!(tax_id = %record.tax_id, "No phone or email, skipping");
            return Ok(VisitOutcome::Invalid(record.tax_id));
        }

        tracing::info!(
            tax_id = %record.tax_id,
            phones = record.phones.len(),
            email = record.email.is_some(),
            "Company extracted"
        );
        Ok(VisitOutcome::Accepted(Box::new(record)))
    }
}
