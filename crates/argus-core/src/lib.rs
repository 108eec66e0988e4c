pub mod batch;
pub mod challenge;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod models;
pub mod pacing;
pub mod site;
pub mod traits;
pub mod traversal;
pub mod visitor;

#[cfg(test)]
pub mod testutil;

pub use batch::{BatchOrchestrator, BatchReporter, RunSummary, TracingBatchReporter};
pub use config::HarvestConfig;
pub use error::AppError;
pub use extract::{ExtractionPlan, FieldExtractor, extract_company};
pub use models::{CandidateReference, CompanyRecord, DateRange, merge_records};
pub use traits::{ChallengeSolver, PageClient, RecordStore};
