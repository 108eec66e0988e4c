use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Tax IDs already persisted for the current batch target.
pub type SeenTaxIds = HashSet<String>;

/// One company extracted from a registry detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub tax_id: String,
    pub registration_date: Option<String>,
    pub director_name: Option<String>,
    pub director_tax_id: Option<String>,
    pub founder_name: Option<String>,
    pub founder_tax_id: Option<String>,
    /// Display form of each phone, in discovery order, unique by digits.
    pub phones: Vec<String>,
    pub email: Option<String>,
    pub activity_code: Option<String>,
    pub activity_description: Option<String>,
    pub legal_address: Option<String>,
    pub charter_capital: Option<String>,
    pub source_url: String,
    pub discovered_at: DateTime<Utc>,
}

impl CompanyRecord {
    /// A bare record carrying only the key and its origin.
    pub fn new(tax_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            tax_id: tax_id.into(),
            registration_date: None,
            director_name: None,
            director_tax_id: None,
            founder_name: None,
            founder_tax_id: None,
            phones: Vec::new(),
            email: None,
            activity_code: None,
            activity_description: None,
            legal_address: None,
            charter_capital: None,
            source_url: source_url.into(),
            discovered_at: Utc::now(),
        }
    }

    /// A record may be persisted only with a tax ID and at least one
    /// contact channel.
    pub fn is_valid_for_persistence(&self) -> bool {
        !self.tax_id.trim().is_empty()
            && (!self.phones.is_empty() || self.email.as_deref().is_some_and(|e| !e.is_empty()))
    }

    /// Adds a phone unless one with the same digits is already present.
    pub fn push_phone(&mut self, phone: &str) -> bool {
        let display = normalize_phone(phone);
        let key = phone_key(&display);
        if key.is_empty() || self.phones.iter().any(|p| phone_key(p) == key) {
            return false;
        }
        self.phones.push(display);
        true
    }
}

/// Collapses whitespace in a phone as displayed on the page.
pub fn normalize_phone(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity of a phone number: its digits, with the leading `+` kept.
pub fn phone_key(phone: &str) -> String {
    let trimmed = phone.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') && !digits.is_empty() {
        format!("+{digits}")
    } else {
        digits
    }
}

/// Absolute URL of a company detail page discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateReference(String);

impl CandidateReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, used to name diagnostic screenshots.
    pub fn slug(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for CandidateReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive registration-date window covering one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// The full calendar month `year-month`.
    pub fn month(year: i32, month: u32) -> Result<Self, AppError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppError::ConfigError(format!("Invalid month {year}-{month:02}")))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| {
                AppError::ConfigError(format!("Month out of range: {year}-{month:02}"))
            })?;
        Ok(Self { start, end })
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(start);
        Self { start, end }
    }

    /// Parses `YYYY-MM`.
    pub fn parse_month(s: &str) -> Result<Self, AppError> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map_err(|e| {
                AppError::ConfigError(format!("Invalid month '{s}' (expected YYYY-MM): {e}"))
            })?;
        Ok(Self::containing(date))
    }

    /// Every month from `newest` back to `oldest`, both included, newest first.
    pub fn months_descending(newest: DateRange, oldest: DateRange) -> Vec<DateRange> {
        let mut months = Vec::new();
        let mut current = newest;
        while current.start >= oldest.start {
            months.push(current);
            match current.start.checked_sub_months(Months::new(1)) {
                Some(prev) => current = Self::containing(prev),
                None => break,
            }
        }
        months
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Lowercase month name and year, e.g. `may_2025`.
    pub fn label(&self) -> String {
        self.start.format("%B_%Y").to_string().to_lowercase()
    }

    /// Record store target for this month.
    pub fn target(&self) -> String {
        self.label()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Result of merging new records into a store's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub records: Vec<CompanyRecord>,
    /// New records whose tax ID was not in the store.
    pub added: usize,
    /// New records that replaced a stored record with the same tax ID.
    pub replaced: usize,
    /// New records dropped for failing the validity invariant.
    pub rejected: usize,
}

/// Merges `new_records` into `existing`, keyed by tax ID.
///
/// Stored order is preserved; on conflict the later record takes the
/// earlier one's position. Invalid new records are never let through.
/// Stored records are all kept, with duplicate tax IDs collapsed.
pub fn merge_records(existing: Vec<CompanyRecord>, new_records: &[CompanyRecord]) -> MergeOutcome {
    let mut records: Vec<CompanyRecord> = Vec::with_capacity(existing.len() + new_records.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in existing {
        if !record.is_valid_for_persistence() {
            tracing::warn!(tax_id = %record.tax_id, "Stored record has no contact, keeping it");
        }
        match index.get(&record.tax_id) {
            Some(&pos) => records[pos] = record,
            None => {
                index.insert(record.tax_id.clone(), records.len());
                records.push(record);
            }
        }
    }

    let (mut added, mut replaced, mut rejected) = (0, 0, 0);
    for record in new_records {
        if !record.is_valid_for_persistence() {
            rejected += 1;
            continue;
        }
        match index.get(&record.tax_id) {
            Some(&pos) => {
                records[pos] = record.clone();
                replaced += 1;
            }
            None => {
                index.insert(record.tax_id.clone(), records.len());
                records.push(record.clone());
                added += 1;
            }
        }
    }

    MergeOutcome {
        records,
        added,
        replaced,
        rejected,
    }
}
