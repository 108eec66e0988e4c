use argus_core::traits::RecordStore;

use crate::integration::common::{record, tax_ids, temp_store};

#[tokio::test]
async fn missing_target_loads_empty() {
    let (store, _dir) = temp_store();
    assert!(store.load("may_2025").await.unwrap().is_empty());
    assert!(store.targets().unwrap().is_empty());
}

#[tokio::test]
async fn save_and_load_full_record() {
    let (store, _dir) = temp_store();

    let mut company = record("7701234567", Some("+7 495 123-45-67"), Some("info@romashka.ru"));
    company.push_phone("8 800 555-35-35");
    company.registration_date = Some("15.05.2025".into());
    company.director_name = Some("Иванов Иван Иванович".into());
    company.director_tax_id = Some("770112345678".into());
    company.founder_name = Some("Сидорова Анна, ООО \"Ромашка\"".into());
    company.activity_code = Some("62.01".into());
    company.activity_description = Some("Разработка компьютерного программного обеспечения".into());
    company.legal_address = Some("г. Москва, ул. Тверская, д. 1".into());
    company.charter_capital = Some("10 000 руб.".into());

    let written = store
        .merge_and_save("may_2025", Vec::new(), std::slice::from_ref(&company))
        .await
        .unwrap();
    assert_eq!(written, 1);

    let loaded = store.load("may_2025").await.unwrap();
    assert_eq!(loaded, vec![company]);
    assert!(store.path_for("may_2025").unwrap().exists());
    assert_eq!(store.targets().unwrap(), vec!["may_2025"]);
}

#[tokio::test]
async fn invalid_records_are_never_written() {
    let (store, _dir) = temp_store();
    let records = vec![
        record("7701234567", Some("+7 495 123-45-67"), None),
        record("7701234568", None, None),
        record("", Some("+7 495 000-00-00"), None),
        record("7701234569", None, Some("sales@example.ru")),
    ];

    let written = store.merge_and_save("may_2025", Vec::new(), &records).await.unwrap();

    assert_eq!(written, 2);
    let loaded = store.load("may_2025").await.unwrap();
    assert_eq!(tax_ids(&loaded), vec!["7701234567", "7701234569"]);
}

#[tokio::test]
async fn merge_is_idempotent() {
    let (store, _dir) = temp_store();
    let batch = vec![
        record("7701234567", Some("+7 495 123-45-67"), None),
        record("7701234568", None, Some("a@example.ru")),
    ];

    let existing = store.load("may_2025").await.unwrap();
    store.merge_and_save("may_2025", existing, &batch).await.unwrap();
    let once = store.load("may_2025").await.unwrap();

    let existing = store.load("may_2025").await.unwrap();
    store.merge_and_save("may_2025", existing, &batch).await.unwrap();
    let twice = store.load("may_2025").await.unwrap();

    assert_eq!(once, twice);
}

#[tokio::test]
async fn later_record_wins_in_place() {
    let (store, _dir) = temp_store();
    let first = vec![
        record("7701234567", Some("+7 495 123-45-67"), None),
        record("7701234568", None, Some("old@example.ru")),
        record("7701234569", Some("+7 812 000-00-00"), None),
    ];
    store.merge_and_save("may_2025", Vec::new(), &first).await.unwrap();

    let update = vec![
        record("7701234568", None, Some("new@example.ru")),
        record("7701234570", None, Some("fresh@example.ru")),
    ];
    let existing = store.load("may_2025").await.unwrap();
    let written = store.merge_and_save("may_2025", existing, &update).await.unwrap();
    assert_eq!(written, 2);

    let loaded = store.load("may_2025").await.unwrap();
    assert_eq!(
        tax_ids(&loaded),
        vec!["7701234567", "7701234568", "7701234569", "7701234570"]
    );
    assert_eq!(loaded[1].email.as_deref(), Some("new@example.ru"));
}

#[tokio::test]
async fn duplicate_tax_ids_collapse() {
    let (store, _dir) = temp_store();
    let batch = vec![
        record("7701234567", Some("+7 495 123-45-67"), None),
        record("7701234567", Some("+7 495 765-43-21"), None),
    ];

    store.merge_and_save("may_2025", Vec::new(), &batch).await.unwrap();
    // Existing contents carrying a duplicate are collapsed on the next save.
    let mut existing = store.load("may_2025").await.unwrap();
    existing.push(existing[0].clone());
    store.merge_and_save("may_2025", existing, &[]).await.unwrap();

    let loaded = store.load("may_2025").await.unwrap();
    assert_eq!(tax_ids(&loaded), vec!["7701234567"]);
    assert_eq!(loaded[0].phones, vec!["+7 495 765-43-21"]);
}

#[tokio::test]
async fn targets_are_separate_files() {
    let (store, _dir) = temp_store();
    store
        .merge_and_save("may_2025", Vec::new(), &[record("1", Some("+7 1"), None)])
        .await
        .unwrap();
    store
        .merge_and_save("april_2025", Vec::new(), &[record("2", Some("+7 2"), None)])
        .await
        .unwrap();

    assert_eq!(store.targets().unwrap(), vec!["april_2025", "may_2025"]);
    assert_eq!(tax_ids(&store.load("may_2025").await.unwrap()), vec!["1"]);
    assert_eq!(tax_ids(&store.load("april_2025").await.unwrap()), vec!["2"]);
}

#[tokio::test]
async fn legacy_files_load() {
    let (store, _dir) = temp_store();
    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(
        store.path_for("march_2025").unwrap(),
        "tax_id,registration_date,director_name,director_tax_id,founder_name,founder_tax_id,\
phones,email,activity_code,activity_description,legal_address,charter_capital,source_url,discovered_at\n\
7701234567,,,,,,\"+7 495 123-45-67, +7 (495) 123-45-67\",,,,,,https://checko.ru/company/x,2025-03-02 10:00:00\n",
    )
    .unwrap();

    let loaded = store.load("march_2025").await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].phones, vec!["+7 495 123-45-67"]);
    assert_eq!(loaded[0].registration_date, None);
    assert_eq!(loaded[0].discovered_at.to_rfc3339(), "2025-03-02T10:00:00+00:00");
}

#[tokio::test]
async fn invalid_target_is_rejected() {
    let (store, _dir) = temp_store();
    assert!(store.load("../escape").await.is_err());
}

#[tokio::test]
async fn stored_rows_without_contact_survive_a_flush() {
    let (store, _dir) = temp_store();
    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(
        store.path_for("may_2025").unwrap(),
        "tax_id,registration_date,director_name,director_tax_id,founder_name,founder_tax_id,\
phones,email,activity_code,activity_description,legal_address,charter_capital,source_url,discovered_at\n\
7700000001,,,,,,,,,,,,https://checko.ru/company/a,2025-05-02T10:00:00+00:00\n",
    )
    .unwrap();

    let existing = store.load("may_2025").await.unwrap();
    let fresh = record("7700000002", Some("+7 495 123-45-67"), None);
    let written = store
        .merge_and_save("may_2025", existing, &[fresh])
        .await
        .unwrap();
    assert_eq!(written, 1);

    let loaded = store.load("may_2025").await.unwrap();
    assert_eq!(tax_ids(&loaded), vec!["7700000001", "7700000002"]);
}
