//! Append-only operational history of enrollments and identifications.
//!
//! The log keeps at most [`AUDIT_CAPACITY`] entries, evicting the oldest
//! first, and writes through to an [`AuditPersistence`] port on every
//! append. Entries are never edited or removed individually.

use std::{
  cmp::Reverse,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::Result;

pub const AUDIT_CAPACITY: usize = 1000;

// ─── Entry types ─────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
  #[serde(alias = "Enrôlement", alias = "Enrollment")]
  Enrollment,
  #[serde(alias = "Identification")]
  Identification,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
  #[serde(alias = "succès")]
  Success,
  #[serde(alias = "non trouvé")]
  #[strum(to_string = "Not found")]
  NotFound,
  #[serde(alias = "erreur")]
  Error,
}

/// One logged operation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOperation {
  pub id:            Uuid,
  #[serde(alias = "date")]
  pub recorded_at:   DateTime<Utc>,
  #[serde(rename = "type")]
  pub kind:          OperationType,
  #[serde(alias = "agent")]
  pub operator:      String,
  pub result:        OperationResult,
  #[serde(alias = "citizenCni", default, skip_serializing_if = "Option::is_none")]
  pub national_id:   Option<String>,
  #[serde(alias = "duration", default, skip_serializing_if = "Option::is_none")]
  pub duration_secs: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details:       Option<serde_json::Value>,
}

/// An operation about to be appended; the log assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOperation {
  pub kind:          OperationType,
  pub operator:      String,
  pub result:        OperationResult,
  pub national_id:   Option<String>,
  pub duration_secs: Option<f64>,
  pub details:       Option<serde_json::Value>,
}

impl NewOperation {
  pub fn new(
    kind: OperationType,
    operator: impl Into<String>,
    result: OperationResult,
  ) -> Self {
    Self {
      kind,
      operator: operator.into(),
      result,
      national_id: None,
      duration_secs: None,
      details: None,
    }
  }

  pub fn national_id(mut self, id: impl Into<String>) -> Self {
    self.national_id = Some(id.into());
    self
  }

  pub fn duration_secs(mut self, secs: f64) -> Self {
    self.duration_secs = Some(secs);
    self
  }

  pub fn details(mut self, details: serde_json::Value) -> Self {
    self.details = Some(details);
    self
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// A window of whole local calendar days ending today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumIter)]
pub enum Period {
  Today,
  Last7Days,
  Last30Days,
  #[default]
  All,
}

impl Period {
  pub fn label(self) -> &'static str {
    match self {
      Self::Today => "today",
      Self::Last7Days => "last 7 days",
      Self::Last30Days => "last 30 days",
      Self::All => "all time",
    }
  }

  /// `[start, end)` in UTC, or `None` for [`Period::All`].
  pub fn window(
    self,
    now: DateTime<Local>,
  ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let days_back = match self {
      Self::Today => 0,
      Self::Last7Days => 6,
      Self::Last30Days => 29,
      Self::All => return None,
    };
    let today = now.date_naive();
    let start = today.checked_sub_days(Days::new(days_back))?;
    let end = today.checked_add_days(Days::new(1))?;
    Some((local_midnight(start), local_midnight(end)))
  }
}

/// Start of `date` in local time. Falls back to UTC midnight on the rare
/// day whose local midnight does not exist.
fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
  let naive = date.and_time(NaiveTime::MIN);
  Local
    .from_local_datetime(&naive)
    .earliest()
    .map(|dt| dt.to_utc())
    .unwrap_or_else(|| naive.and_utc())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
  pub period: Period,
  pub kind:   Option<OperationType>,
  pub result: Option<OperationResult>,
  /// Case-insensitive over the operator; case-sensitive over the national ID.
  pub search: Option<String>,
}

impl AuditFilter {
  fn matches(
    &self,
    op: &AuditOperation,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
  ) -> bool {
    if let Some((start, end)) = window
      && !(start <= op.recorded_at && op.recorded_at < end)
    {
      return false;
    }
    if self.kind.is_some_and(|k| k != op.kind) {
      return false;
    }
    if self.result.is_some_and(|r| r != op.result) {
      return false;
    }
    match self.search.as_deref().map(str::trim) {
      None | Some("") => true,
      Some(term) => {
        op.operator.to_lowercase().contains(&term.to_lowercase())
          || op.national_id.as_deref().is_some_and(|id| id.contains(term))
      }
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
  pub total:     usize,
  pub success:   usize,
  pub not_found: usize,
  pub error:     usize,
  pub today:     usize,
}

// ─── Persistence ─────────────────────────────────────────────────────────────

/// Where the log is kept between runs.
pub trait AuditPersistence: Send + Sync {
  fn load(&self) -> Result<Vec<AuditOperation>>;
  fn save(&self, entries: &[AuditOperation]) -> Result<()>;
}

/// Keeps the last saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditPersistence {
  saved: Mutex<Vec<AuditOperation>>,
}

impl MemoryAuditPersistence {
  pub fn new() -> Self { Self::default() }

  pub fn with_entries(entries: Vec<AuditOperation>) -> Self {
    Self { saved: Mutex::new(entries) }
  }

  pub fn saved(&self) -> Vec<AuditOperation> {
    self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl AuditPersistence for MemoryAuditPersistence {
  fn load(&self) -> Result<Vec<AuditOperation>> { Ok(self.saved()) }

  fn save(&self, entries: &[AuditOperation]) -> Result<()> {
    *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = entries.to_vec();
    Ok(())
  }
}

// ─── Log ─────────────────────────────────────────────────────────────────────

pub struct AuditLog {
  entries:     Mutex<Vec<AuditOperation>>,
  persistence: Arc<dyn AuditPersistence>,
  capacity:    usize,
}

impl AuditLog {
  /// Open the log over `persistence`. Unreadable history is logged and
  /// replaced by an empty log.
  pub fn open(persistence: Arc<dyn AuditPersistence>) -> Self {
    Self::with_capacity(persistence, AUDIT_CAPACITY)
  }

  pub fn with_capacity(
    persistence: Arc<dyn AuditPersistence>,
    capacity: usize,
  ) -> Self {
    let mut entries = persistence.load().unwrap_or_else(|e| {
      warn!(error = %e, "could not load audit history; starting empty");
      Vec::new()
    });
    evict(&mut entries, capacity);
    Self { entries: Mutex::new(entries), persistence, capacity }
  }

  pub fn in_memory() -> Self { Self::open(Arc::new(MemoryAuditPersistence::new())) }

  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditOperation>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Stamp, append, evict, and persist. A failed save is logged; the
  /// in-memory log still advances.
  pub fn append(&self, operation: NewOperation) -> AuditOperation {
    let entry = AuditOperation {
      id:            Uuid::new_v4(),
      recorded_at:   Utc::now(),
      kind:          operation.kind,
      operator:      operation.operator,
      result:        operation.result,
      national_id:   operation.national_id,
      duration_secs: operation.duration_secs,
      details:       operation.details,
    };

    let mut entries = self.lock();
    entries.push(entry.clone());
    evict(&mut entries, self.capacity);
    if let Err(e) = self.persistence.save(&entries) {
      warn!(error = %e, "could not persist audit log");
    }
    drop(entries);

    info!(
      kind = %entry.kind,
      result = %entry.result,
      national_id = entry.national_id.as_deref().unwrap_or("-"),
      "audit entry recorded"
    );
    entry
  }

  /// All entries in insertion order.
  pub fn entries(&self) -> Vec<AuditOperation> { self.lock().clone() }

  pub fn len(&self) -> usize { self.lock().len() }

  pub fn is_empty(&self) -> bool { self.lock().is_empty() }

  pub fn query(&self, filter: &AuditFilter) -> Vec<AuditOperation> {
    self.query_at(filter, Local::now())
  }

  /// Matching entries, newest first.
  pub fn query_at(
    &self,
    filter: &AuditFilter,
    now: DateTime<Local>,
  ) -> Vec<AuditOperation> {
    let window = filter.period.window(now);
    let mut matched: Vec<_> = self
      .lock()
      .iter()
      .filter(|op| filter.matches(op, window))
      .cloned()
      .collect();
    matched.sort_by_key(|op| Reverse(op.recorded_at));
    matched
  }

  /// The `n` newest entries regardless of any filter.
  pub fn recent(&self, n: usize) -> Vec<AuditOperation> {
    let mut all = self.entries();
    all.sort_by_key(|op| Reverse(op.recorded_at));
    all.truncate(n);
    all
  }

  pub fn stats(&self) -> AuditStats { self.stats_at(Local::now()) }

  pub fn stats_at(&self, now: DateTime<Local>) -> AuditStats {
    let today = Period::Today.window(now);
    self.lock().iter().fold(AuditStats::default(), |mut s, op| {
      s.total += 1;
      match op.result {
        OperationResult::Success => s.success += 1,
        OperationResult::NotFound => s.not_found += 1,
        OperationResult::Error => s.error += 1,
      }
      if let Some((start, end)) = today
        && start <= op.recorded_at
        && op.recorded_at < end
      {
        s.today += 1;
      }
      s
    })
  }

  /// Insert an already-stamped entry; used to seed history in tests.
  #[cfg(test)]
  pub(crate) fn push_raw(&self, entry: AuditOperation) {
    let mut entries = self.lock();
    entries.push(entry);
    evict(&mut entries, self.capacity);
  }
}

fn evict(entries: &mut Vec<AuditOperation>, capacity: usize) {
  if entries.len() > capacity {
    let excess = entries.len() - capacity;
    entries.drain(..excess);
  }
}
