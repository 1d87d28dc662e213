//! In-memory fakes of the core ports for unit tests.

use std::sync::{
  Mutex,
  atomic::{AtomicBool, AtomicU32, Ordering},
};

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
  citizen::{NewCitizen, Operator, RawRecord, Sex},
  national_id::NationalId,
  session::{AuthUser, Authenticator},
  store::{CitizenStore, ObjectStorage, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum FakeError {
  #[error("backend unavailable")]
  Unavailable,
  #[error("duplicate key")]
  Duplicate,
  #[error("no such column: {0}")]
  NoSuchColumn(String),
  #[error("invalid credentials")]
  BadCredentials,
}

impl StoreError for FakeError {
  fn is_unique_violation(&self) -> bool { matches!(self, Self::Duplicate) }

  fn is_invalid_query(&self) -> bool { matches!(self, Self::NoSuchColumn(_)) }
}

pub fn raw(value: Value) -> RawRecord {
  match value {
    Value::Object(map) => map,
    other => panic!("expected a JSON object, got {other}"),
  }
}

pub fn sample_citizen(id: NationalId) -> NewCitizen {
  let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
  NewCitizen {
    national_id:     id,
    family_name:     "Ndiaye".into(),
    given_names:     "Awa".into(),
    birth_date:      date(1990, 5, 12),
    birth_place:     "Thiès".into(),
    sex:             Sex::F,
    height_cm:       168,
    profession:      "Nurse".into(),
    address:         "Rue 10, Médina, Dakar".into(),
    phone:           "+221771234567".into(),
    email:           None,
    issue_date:      date(2025, 1, 2),
    expiration_date: date(2035, 1, 2),
    authority:       "SIP / DAKAR-PLATEAU".into(),
    card_series:     "AB12CD3".into(),
    photo_url:       None,
    iris_left_url:   None,
    iris_right_url:  None,
    latitude:        None,
    longitude:       None,
    operator_id:     "op-1".into(),
  }
}

// ─── Record store ────────────────────────────────────────────────────────────

pub struct FakeStore {
  rows:                    Mutex<Vec<RawRecord>>,
  operators:               Mutex<Vec<Operator>>,
  /// Columns `list_citizens` accepts for ordering.
  pub orderable:           Mutex<Vec<String>>,
  pub fail_max_sequence:   AtomicBool,
  pub fail_list:           AtomicBool,
  pub fail_insert:         AtomicBool,
  /// Reject this many inserts as duplicates before accepting any.
  pub conflicts_remaining: AtomicU32,
}

impl FakeStore {
  pub fn new() -> Self {
    Self {
      rows:                Mutex::default(),
      operators:           Mutex::default(),
      orderable:           Mutex::new(vec!["enrolled_at".into()]),
      fail_max_sequence:   AtomicBool::new(false),
      fail_list:           AtomicBool::new(false),
      fail_insert:         AtomicBool::new(false),
      conflicts_remaining: AtomicU32::new(0),
    }
  }

  pub fn push_row(&self, row: RawRecord) { self.rows.lock().unwrap().push(row); }

  pub fn rows(&self) -> Vec<RawRecord> { self.rows.lock().unwrap().clone() }

  pub fn add_operator(&self, user_id: &str, display_name: &str) {
    self.operators.lock().unwrap().push(Operator {
      user_id:      user_id.into(),
      email:        format!("{user_id}@example.sn"),
      display_name: display_name.into(),
    });
  }
}

impl CitizenStore for FakeStore {
  type Error = FakeError;

  async fn max_sequence_for_year(&self, year: i32) -> Result<Option<u32>, FakeError> {
    if self.fail_max_sequence.load(Ordering::SeqCst) {
      return Err(FakeError::Unavailable);
    }
    Ok(
      self
        .rows()
        .iter()
        .filter_map(|r| r.get("national_id")?.as_str())
        .filter_map(|id| NationalId::sequence_for_year(id, year))
        .max(),
    )
  }

  async fn list_citizens(
    &self,
    order_by: Option<&str>,
  ) -> Result<Vec<RawRecord>, FakeError> {
    if self.fail_list.load(Ordering::SeqCst) {
      return Err(FakeError::Unavailable);
    }
    let mut rows = self.rows();
    if let Some(column) = order_by {
      if !self.orderable.lock().unwrap().iter().any(|c| c == column) {
        return Err(FakeError::NoSuchColumn(column.into()));
      }
      let key = |r: &RawRecord| {
        r.get(column).and_then(Value::as_str).unwrap_or_default().to_owned()
      };
      rows.sort_by_key(|r| std::cmp::Reverse(key(r)));
    }
    Ok(rows)
  }

  async fn find_citizen(
    &self,
    field: &str,
    value: &str,
  ) -> Result<Option<RawRecord>, FakeError> {
    Ok(
      self
        .rows()
        .into_iter()
        .find(|r| r.get(field).and_then(Value::as_str) == Some(value)),
    )
  }

  async fn count_citizens(&self) -> Result<u64, FakeError> {
    Ok(self.rows().len() as u64)
  }

  async fn insert_citizen(&self, citizen: NewCitizen) -> Result<RawRecord, FakeError> {
    if self.fail_insert.load(Ordering::SeqCst) {
      return Err(FakeError::Unavailable);
    }
    if self
      .conflicts_remaining
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok()
    {
      return Err(FakeError::Duplicate);
    }

    let national_id = citizen.national_id.to_string();
    let mut rows = self.rows.lock().unwrap();
    if rows
      .iter()
      .any(|r| r.get("national_id").and_then(Value::as_str) == Some(&national_id))
    {
      return Err(FakeError::Duplicate);
    }

    let Ok(Value::Object(mut row)) = serde_json::to_value(&citizen) else {
      return Err(FakeError::Unavailable);
    };
    row.insert("id".into(), Uuid::new_v4().to_string().into());
    row.insert("enrolled_at".into(), Utc::now().to_rfc3339().into());
    rows.push(row.clone());
    Ok(row)
  }

  async fn find_operator(&self, user_id: &str) -> Result<Option<Operator>, FakeError> {
    Ok(
      self
        .operators
        .lock()
        .unwrap()
        .iter()
        .find(|o| o.user_id == user_id)
        .cloned(),
    )
  }
}

// ─── Object storage ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeStorage {
  pub objects: Mutex<Vec<(String, String, Bytes)>>,
  pub fail:    AtomicBool,
}

impl ObjectStorage for FakeStorage {
  type Error = FakeError;

  async fn upload(
    &self,
    bucket: &str,
    key: &str,
    bytes: Bytes,
    _content_type: &str,
  ) -> Result<String, FakeError> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(FakeError::Unavailable);
    }
    let mut objects = self.objects.lock().unwrap();
    if objects.iter().any(|(b, k, _)| b == bucket && k == key) {
      return Err(FakeError::Duplicate);
    }
    objects.push((bucket.into(), key.into(), bytes));
    Ok(self.public_url(bucket, key))
  }

  fn public_url(&self, bucket: &str, key: &str) -> String {
    format!("memory://{bucket}/{key}")
  }
}

// ─── Authenticator ───────────────────────────────────────────────────────────

pub struct FakeAuth {
  password: String,
  session:  watch::Sender<Option<AuthUser>>,
}

impl FakeAuth {
  pub fn new(password: &str) -> Self {
    Self { password: password.into(), session: watch::Sender::new(None) }
  }
}

impl Authenticator for FakeAuth {
  type Error = FakeError;

  async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, FakeError> {
    if password != self.password {
      return Err(FakeError::BadCredentials);
    }
    let user = AuthUser {
      user_id:      format!("user-{email}"),
      email:        email.into(),
      display_name: None,
    };
    self.session.send_replace(Some(user.clone()));
    Ok(user)
  }

  async fn sign_out(&self) -> Result<(), FakeError> {
    self.session.send_replace(None);
    Ok(())
  }

  async fn current_session(&self) -> Result<Option<AuthUser>, FakeError> {
    Ok(self.session.borrow().clone())
  }

  fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> { self.session.subscribe() }
}
