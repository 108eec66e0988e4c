use argus_core::models::CompanyRecord;
use argus_store::CsvRecordStore;
use tempfile::TempDir;

/// A store rooted in a fresh temporary directory.
///
/// The `TempDir` must be kept in scope for the test duration; dropping it
/// deletes the directory.
pub fn temp_store() -> (CsvRecordStore, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    (CsvRecordStore::new(dir.path().join("out")), dir)
}

pub fn record(tax_id: &str, phone: Option<&str>, email: Option<&str>) -> CompanyRecord {
    let mut record = CompanyRecord::new(tax_id, format!("https://checko.ru/company/{tax_id}"));
    if let Some(phone) = phone {
        record.push_phone(phone);
    }
    record.email = email.map(str::to_string);
    record
}

pub fn tax_ids(records: &[CompanyRecord]) -> Vec<&str> {
    records.iter().map(|r| r.tax_id.as_str()).collect()
}
