//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Datelike, Local, NaiveDate};
use eyedentify_core::{
  allocator::{AllocationSource, IdentifierAllocator},
  audit::{AuditLog, OperationResult, OperationType},
  citizen::{NewCitizen, Sex},
  directory::CitizenDirectory,
  draft::{MemoryDraftStore, SessionId},
  iris::IrisScanner,
  national_id::NationalId,
  store::{CitizenStore, StoreError},
  validation::BiographicForm,
  wizard::EnrollmentWizard,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{DiskObjectStorage, Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn citizen(id: NationalId, operator_id: &str) -> NewCitizen {
  let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
  NewCitizen {
    national_id:     id,
    family_name:     "Sow".into(),
    given_names:     "Moussa".into(),
    birth_date:      date(1985, 11, 3),
    birth_place:     "Dakar".into(),
    sex:             Sex::M,
    height_cm:       181,
    profession:      "Fisherman".into(),
    address:         "Quartier Soumbédioune, Dakar".into(),
    phone:           "+221776543210".into(),
    email:           Some("moussa@example.sn".into()),
    issue_date:      date(2025, 1, 2),
    expiration_date: date(2035, 1, 2),
    authority:       "SIP / DAKAR-PLATEAU".into(),
    card_series:     "Q7X2M9A".into(),
    photo_url:       None,
    iris_left_url:   None,
    iris_right_url:  None,
    latitude:        Some(14.6928),
    longitude:       Some(-17.4467),
    operator_id:     operator_id.into(),
  }
}

async fn with_operator() -> (SqliteStore, String) {
  let s = store().await;
  let op = s
    .add_operator("Agent@Example.sn", "Mariama Diallo", "$argon2id$stub")
    .await
    .unwrap();
  (s, op.user_id)
}

// ─── Operators ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn operators_round_trip() {
  let (s, user_id) = with_operator().await;

  let op = s.find_operator(&user_id).await.unwrap().unwrap();
  assert_eq!(op.email, "agent@example.sn");
  assert_eq!(op.display_name, "Mariama Diallo");

  let account = s.find_operator_account("AGENT@example.sn").await.unwrap().unwrap();
  assert_eq!(account.operator, op);
  assert_eq!(account.password_hash, "$argon2id$stub");

  assert!(s.find_operator("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_operator_email_is_a_unique_violation() {
  let (s, _) = with_operator().await;
  let err = s
    .add_operator("agent@example.sn", "Someone Else", "$argon2id$stub")
    .await
    .unwrap_err();
  assert!(err.is_unique_violation());
}

// ─── Citizens ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_returns_the_stored_row() {
  let (s, op) = with_operator().await;
  let row = s
    .insert_citizen(citizen(NationalId::new(2025, 1), &op))
    .await
    .unwrap();

  assert_eq!(row["national_id"], "SN-2025-000001");
  assert_eq!(row["birth_date"], "1985-11-03");
  assert_eq!(row["sex"], "M");
  assert_eq!(row["height_cm"], 181);
  assert_eq!(row["latitude"], 14.6928);
  assert!(row["photo_url"].is_null());
  assert!(row["enrolled_at"].as_str().is_some());
  assert_eq!(s.count_citizens().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_national_id_is_a_unique_violation() {
  let (s, op) = with_operator().await;
  let id = NationalId::new(2025, 7);
  s.insert_citizen(citizen(id, &op)).await.unwrap();
  let err = s.insert_citizen(citizen(id, &op)).await.unwrap_err();
  assert!(err.is_unique_violation());
}

#[tokio::test]
async fn unknown_operator_is_rejected() {
  let s = store().await;
  let err = s
    .insert_citizen(citizen(NationalId::new(2025, 1), "ghost"))
    .await
    .unwrap_err();
  assert!(!err.is_unique_violation());
  assert_eq!(s.count_citizens().await.unwrap(), 0);
}

#[tokio::test]
async fn citizens_are_immutable() {
  let (s, op) = with_operator().await;
  s.insert_citizen(citizen(NationalId::new(2025, 1), &op)).await.unwrap();

  let update = s
    .connection()
    .call(|conn| {
      conn.execute("UPDATE citizens SET family_name = 'X'", [])?;
      Ok(())
    })
    .await;
  assert!(update.is_err());

  let delete = s
    .connection()
    .call(|conn| {
      conn.execute("DELETE FROM citizens", [])?;
      Ok(())
    })
    .await;
  assert!(delete.is_err());
  assert_eq!(s.count_citizens().await.unwrap(), 1);
}

#[tokio::test]
async fn max_sequence_is_per_year() {
  let (s, op) = with_operator().await;
  assert_eq!(s.max_sequence_for_year(2025).await.unwrap(), None);

  for id in [
    NationalId::new(2025, 3),
    NationalId::new(2025, 12),
    NationalId::new(2024, 99),
  ] {
    s.insert_citizen(citizen(id, &op)).await.unwrap();
  }
  assert_eq!(s.max_sequence_for_year(2025).await.unwrap(), Some(12));
  assert_eq!(s.max_sequence_for_year(2024).await.unwrap(), Some(99));
  assert_eq!(s.max_sequence_for_year(2023).await.unwrap(), None);
}

#[tokio::test]
async fn ordering_by_unknown_column_fails() {
  let (s, op) = with_operator().await;
  s.insert_citizen(citizen(NationalId::new(2025, 1), &op)).await.unwrap();

  assert!(s.list_citizens(Some("enrolled_at")).await.is_ok());
  for bad in ["created_at", "date_enregistrement", "id; DROP TABLE citizens"] {
    let err = s.list_citizens(Some(bad)).await.unwrap_err();
    assert!(matches!(err, Error::UnknownColumn(_)));
    assert!(err.is_invalid_query());
  }
  assert_eq!(s.list_citizens(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn list_is_newest_first() {
  let (s, op) = with_operator().await;
  for n in 1..=3 {
    s.insert_citizen(citizen(NationalId::new(2025, n), &op)).await.unwrap();
  }
  let rows = s.list_citizens(Some("enrolled_at")).await.unwrap();
  assert_eq!(rows[0]["national_id"], "SN-2025-000003");
  assert_eq!(rows[2]["national_id"], "SN-2025-000001");
}

#[tokio::test]
async fn find_by_field() {
  let (s, op) = with_operator().await;
  s.insert_citizen(citizen(NationalId::new(2025, 5), &op)).await.unwrap();

  let row = s.find_citizen("national_id", "SN-2025-000005").await.unwrap();
  assert!(row.is_some());
  assert!(s.find_citizen("national_id", "SN-2025-000006").await.unwrap().is_none());
  // Legacy column names do not exist in this schema.
  assert!(s.find_citizen("cni", "SN-2025-000005").await.is_err());
}

// ─── Allocation against SQLite ───────────────────────────────────────────────

#[tokio::test]
async fn concurrent_allocations_never_collide() {
  let (s, op) = with_operator().await;
  let store = Arc::new(s);

  let mut tasks = Vec::new();
  for _ in 0..8 {
    let store = Arc::clone(&store);
    let op = op.clone();
    tasks.push(tokio::spawn(async move {
      IdentifierAllocator::new(store)
        .with_max_attempts(16)
        .insert_with_retry(&CancellationToken::new(), |id| citizen(id, &op))
        .await
        .map(|(id, _)| id)
    }));
  }

  let mut ids = Vec::new();
  for task in tasks {
    ids.push(task.await.unwrap().unwrap());
  }
  ids.sort();
  ids.dedup();
  assert_eq!(ids.len(), 8);
  assert_eq!(store.count_citizens().await.unwrap(), 8);

  let year = Local::now().year();
  let alloc = IdentifierAllocator::new(store).allocate_for_year(year).await;
  assert_eq!(alloc.source, AllocationSource::Atomic);
  assert_eq!(alloc.id.sequence(), 9);
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_awa_ndiaye_end_to_end() {
  let (s, op) = with_operator().await;
  let store = Arc::new(s);
  let photos = tempfile::tempdir().unwrap();
  let storage = Arc::new(DiskObjectStorage::new(photos.path(), "http://localhost:8080"));
  let audit = Arc::new(AuditLog::in_memory());
  let cancel = CancellationToken::new();

  let mut wizard = EnrollmentWizard::new(
    Arc::clone(&store),
    storage,
    Arc::new(MemoryDraftStore::new()),
    Arc::clone(&audit),
    SessionId::new(),
  )
  .unwrap();

  wizard
    .submit_biographic(&BiographicForm {
      given_names: "Awa".into(),
      family_name: "Ndiaye".into(),
      birth_date:  "1990-05-12".into(),
      birth_place: "Thiès".into(),
      sex:         "F".into(),
      address:     "Rue 10, Médina, Dakar".into(),
      phone:       "+221771234567".into(),
      email:       String::new(),
      height_cm:   "165".into(),
      profession:  "Nurse".into(),
      consent:     true,
    })
    .unwrap();
  let photo = wizard
    .submit_photo(Bytes::from_static(b"\xff\xd8\xff"), "image/jpeg", &cancel)
    .await
    .unwrap();
  assert!(photo.url.starts_with("http://localhost:8080/storage/photos-cni/"));

  let (tx, _rx) = mpsc::unbounded_channel();
  wizard.scan_iris(&IrisScanner::instant(), &tx, &cancel).await.unwrap();
  let record = wizard.finalize(&op, &cancel).await.unwrap();

  let year = Local::now().year();
  assert_eq!(record.national_id, format!("SN-{year}-000001"));
  assert_eq!(record.full_name(), "Awa Ndiaye");

  let entries = audit.entries();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].kind, OperationType::Enrollment);
  assert_eq!(entries[0].result, OperationResult::Success);
  assert_eq!(entries[0].national_id.as_deref(), Some(record.national_id.as_str()));

  let directory = CitizenDirectory::new(store);
  let row = directory.get_by_national_id(&record.national_id).await.unwrap();
  assert_eq!(row["given_names"], "Awa");
  assert_eq!(row["birth_place"], "Thiès");
  let listed = directory.records().await.unwrap();
  assert_eq!(listed.len(), 1);
  assert!(listed[0].enrolled_today);
  assert_eq!(listed[0].sex, Sex::F);
}
