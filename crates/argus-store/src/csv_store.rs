use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use argus_core::error::AppError;
use argus_core::models::{CompanyRecord, merge_records};
use argus_core::traits::RecordStore;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const LEGACY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const PHONE_SEPARATOR: &str = ", ";

/// Record store writing one `<target>.csv` per month into a directory.
///
/// Every save rewrites the whole file through a temporary sibling and a
/// rename, so a crash mid-write leaves the previous contents intact.
/// Single-writer access is assumed.
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    dir: PathBuf,
}

/// On-disk row layout. Phones share one column, joined with `, `.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    tax_id: String,
    registration_date: Option<String>,
    director_name: Option<String>,
    director_tax_id: Option<String>,
    founder_name: Option<String>,
    founder_tax_id: Option<String>,
    phones: Option<String>,
    email: Option<String>,
    activity_code: Option<String>,
    activity_description: Option<String>,
    legal_address: Option<String>,
    charter_capital: Option<String>,
    source_url: String,
    discovered_at: String,
}

impl From<&CompanyRecord> for CsvRow {
    fn from(r: &CompanyRecord) -> Self {
        Self {
            tax_id: r.tax_id.clone(),
            registration_date: r.registration_date.clone(),
            director_name: r.director_name.clone(),
            director_tax_id: r.director_tax_id.clone(),
            founder_name: r.founder_name.clone(),
            founder_tax_id: r.founder_tax_id.clone(),
            phones: (!r.phones.is_empty()).then(|| r.phones.join(PHONE_SEPARATOR)),
            email: r.email.clone(),
            activity_code: r.activity_code.clone(),
            activity_description: r.activity_description.clone(),
            legal_address: r.legal_address.clone(),
            charter_capital: r.charter_capital.clone(),
            source_url: r.source_url.clone(),
            discovered_at: r.discovered_at.to_rfc3339(),
        }
    }
}

impl CsvRow {
    fn into_record(self) -> Result<CompanyRecord, AppError> {
        let discovered_at = parse_timestamp(&self.discovered_at).ok_or_else(|| {
            AppError::StoreError(format!(
                "Invalid discovered_at '{}' for tax ID {}",
                self.discovered_at, self.tax_id
            ))
        })?;

        let mut record = CompanyRecord::new(self.tax_id, self.source_url);
        record.registration_date = self.registration_date;
        record.director_name = self.director_name;
        record.director_tax_id = self.director_tax_id;
        record.founder_name = self.founder_name;
        record.founder_tax_id = self.founder_tax_id;
        for phone in split_phones(self.phones.as_deref().unwrap_or_default()) {
            record.push_phone(&phone);
        }
        record.email = self.email;
        record.activity_code = self.activity_code;
        record.activity_description = self.activity_description;
        record.legal_address = self.legal_address;
        record.charter_capital = self.charter_capital;
        record.discovered_at = discovered_at;
        Ok(record)
    }
}

/// Splits the phones column. A piece that does not start like a number
/// (e.g. `доб. 12`) belongs to the phone before it.
fn split_phones(cell: &str) -> Vec<String> {
    let mut phones: Vec<String> = Vec::new();
    for piece in cell.split(PHONE_SEPARATOR).map(str::trim).filter(|p| !p.is_empty()) {
        let starts_number =
            piece.starts_with(|c: char| c.is_ascii_digit() || c == '+' || c == '(');
        match phones.last_mut() {
            Some(last) if !starts_number => {
                last.push_str(PHONE_SEPARATOR);
                last.push_str(piece);
            }
            _ => phones.push(piece.to_string()),
        }
    }
    phones
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP)
                .ok()
                .map(|dt| dt.and_utc())
        })
}

impl CsvRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `target`.
    pub fn path_for(&self, target: &str) -> Result<PathBuf, AppError> {
        let valid = !target.is_empty()
            && target
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AppError::StoreError(format!("Invalid target name '{target}'")));
        }
        Ok(self.dir.join(format!("{target}.csv")))
    }

    /// Targets with a file in the store directory, sorted by name.
    pub fn targets(&self) -> Result<Vec<String>, AppError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::StoreError(format!(
                    "Cannot list {}: {e}",
                    self.dir.display()
                )));
            }
        };
        let mut targets: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
            .filter(|stem| !stem.starts_with('.'))
            .collect();
        targets.sort();
        Ok(targets)
    }

    /// Reads every record of `target`; a missing file is empty.
    pub fn read(&self, target: &str) -> Result<Vec<CompanyRecord>, AppError> {
        let path = self.path_for(target)?;
        let mut reader = match csv::Reader::from_path(&path) {
            Ok(reader) => reader,
            Err(e) if is_not_found(&e) => return Ok(Vec::new()),
            Err(e) => return Err(store_error(&path, e)),
        };
        reader
            .deserialize::<CsvRow>()
            .map(|row| row.map_err(|e| store_error(&path, e))?.into_record())
            .collect()
    }

    /// Replaces the contents of `target` with `records`.
    pub fn write(&self, target: &str, records: &[CompanyRecord]) -> Result<(), AppError> {
        let path = self.path_for(target)?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::StoreError(format!("Cannot create {}: {e}", self.dir.display()))
        })?;

        let tmp = self.dir.join(format!(".{target}.csv.tmp"));
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| store_error(&tmp, e))?;
        for record in records {
            writer
                .serialize(CsvRow::from(record))
                .map_err(|e| store_error(&tmp, e))?;
        }
        writer
            .flush()
            .map_err(|e| AppError::StoreError(format!("Cannot flush {}: {e}", tmp.display())))?;
        drop(writer);

        fs::rename(&tmp, &path).map_err(|e| {
            AppError::StoreError(format!("Cannot replace {}: {e}", path.display()))
        })?;
        Ok(())
    }

    fn merge_and_write(
        &self,
        target: &str,
        existing: Vec<CompanyRecord>,
        new_records: &[CompanyRecord],
    ) -> Result<usize, AppError> {
        let outcome = merge_records(existing, new_records);
        self.write(target, &outcome.records)?;
        tracing::info!(
            %target,
            added = outcome.added,
            replaced = outcome.replaced,
            rejected = outcome.rejected,
            total = outcome.records.len(),
            "Records saved"
        );
        Ok(outcome.added + outcome.replaced)
    }
}

fn is_not_found(e: &csv::Error) -> bool {
    matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound)
}

fn store_error(path: &Path, e: csv::Error) -> AppError {
    AppError::StoreError(format!("{}: {e}", path.display()))
}

async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::StoreError(format!("Store task failed: {e}")))?
}

impl RecordStore for CsvRecordStore {
    async fn load(&self, target: &str) -> Result<Vec<CompanyRecord>, AppError> {
        let store = self.clone();
        let target = target.to_string();
        blocking(move || store.read(&target)).await
    }

    async fn merge_and_save(
        &self,
        target: &str,
        existing: Vec<CompanyRecord>,
        new_records: &[CompanyRecord],
    ) -> Result<usize, AppError> {
        let store = self.clone();
        let target = target.to_string();
        let new_records = new_records.to_vec();
        blocking(move || store.merge_and_write(&target, existing, &new_records)).await
    }
}
