//! Simulated 1:N iris identification.
//!
//! Stands in for a real matcher: a weighted coin decides whether the search
//! "succeeds", and a uniformly random enrolled citizen is returned as the
//! match. Every attempt lands in the audit log.

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::{Duration, Instant},
};

use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
  Error, Result,
  audit::{AuditLog, NewOperation, OperationResult, OperationType},
  citizen::CitizenRecord,
  directory::CitizenDirectory,
  normalize::normalize,
  store::CitizenStore,
};

pub const DEFAULT_SUCCESS_PROBABILITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub enum IdentificationOutcome {
  Match(Box<CitizenRecord>),
  NoMatch,
}

pub struct IdentificationSimulator<S> {
  directory:           CitizenDirectory<S>,
  audit:               Arc<AuditLog>,
  operator:            String,
  success_probability: f64,
  display_delay:       Duration,
  rng:                 Mutex<StdRng>,
}

impl<S: CitizenStore> IdentificationSimulator<S> {
  pub fn new(
    store: Arc<S>,
    audit: Arc<AuditLog>,
    operator: impl Into<String>,
  ) -> Self {
    Self {
      directory: CitizenDirectory::new(store),
      audit,
      operator: operator.into(),
      success_probability: DEFAULT_SUCCESS_PROBABILITY,
      display_delay: Duration::ZERO,
      rng: Mutex::new(StdRng::from_os_rng()),
    }
  }

  /// Clamped to `0.0..=1.0`; NaN counts as zero.
  pub fn with_success_probability(mut self, p: f64) -> Self {
    self.success_probability = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    self
  }

  /// Pause before returning a match.
  pub fn with_display_delay(mut self, delay: Duration) -> Self {
    self.display_delay = delay;
    self
  }

  pub fn with_rng(mut self, rng: StdRng) -> Self {
    self.rng = Mutex::new(rng);
    self
  }

  pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
    self.operator = operator.into();
    self
  }

  pub fn success_probability(&self) -> f64 { self.success_probability }

  /// Run one identification attempt.
  ///
  /// Cancellation before the search starts returns [`Error::Cancelled`] and
  /// logs nothing; cancellation during the display delay only cuts the delay
  /// short.
  pub async fn attempt(
    &self,
    cancel: &CancellationToken,
  ) -> Result<IdentificationOutcome> {
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }
    let started = Instant::now();
    let success = self.lock_rng().random_bool(self.success_probability);

    if !success {
      self.log(OperationResult::NotFound, None, started, None);
      return Ok(IdentificationOutcome::NoMatch);
    }

    let rows = match self.directory.list().await {
      Ok(rows) => rows,
      Err(e) => {
        let details = json!({ "error": e.to_string() });
        self.log(OperationResult::Error, None, started, Some(details));
        return Err(e);
      }
    };
    if rows.is_empty() {
      self.log(
        OperationResult::NotFound,
        None,
        started,
        Some(json!({ "reason": "no citizens enrolled" })),
      );
      return Ok(IdentificationOutcome::NoMatch);
    }

    let pick = self.lock_rng().random_range(0..rows.len());
    let record = normalize(&rows[pick], Utc::now());
    self.log(OperationResult::Success, Some(&record.national_id), started, None);

    tokio::select! {
      biased;
      _ = cancel.cancelled() => {}
      _ = tokio::time::sleep(self.display_delay) => {}
    }
    Ok(IdentificationOutcome::Match(Box::new(record)))
  }

  fn lock_rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
    self.rng.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn log(
    &self,
    result: OperationResult,
    national_id: Option<&str>,
    started: Instant,
    details: Option<serde_json::Value>,
  ) {
    let mut op =
      NewOperation::new(OperationType::Identification, &self.operator, result)
        .duration_secs(started.elapsed().as_secs_f64());
    if let Some(id) = national_id {
      op = op.national_id(id);
    }
    if let Some(details) = details {
      op = op.details(details);
    }
    info!(result = %result, "identification attempt finished");
    self.audit.append(op);
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use serde_json::json;

  use super::*;
  use crate::testing::{FakeStore, raw};

  fn simulator(store: Arc<FakeStore>, p: f64, seed: u64) -> (IdentificationSimulator<FakeStore>, Arc<AuditLog>) {
    let audit = Arc::new(AuditLog::in_memory());
    let sim = IdentificationSimulator::new(store, Arc::clone(&audit), "Agent Fall")
      .with_success_probability(p)
      .with_rng(StdRng::seed_from_u64(seed));
    (sim, audit)
  }

  fn populated() -> Arc<FakeStore> {
    let store = Arc::new(FakeStore::new());
    for n in 1..=3 {
      store.push_row(raw(json!({
        "id": n.to_string(),
        "national_id": format!("SN-2025-{n:06}"),
        "enrolled_at": "2025-01-01T00:00:00Z",
      })));
    }
    store
  }

  #[tokio::test]
  async fn success_returns_a_logged_match() {
    let (sim, audit) = simulator(populated(), 1.0, 1);
    let outcome = sim.attempt(&CancellationToken::new()).await.unwrap();

    let IdentificationOutcome::Match(record) = outcome else { panic!("expected a match") };
    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, OperationType::Identification);
    assert_eq!(entries[0].result, OperationResult::Success);
    assert_eq!(entries[0].national_id.as_deref(), Some(record.national_id.as_str()));
    assert_eq!(entries[0].operator, "Agent Fall");
  }

  #[tokio::test]
  async fn failure_is_logged_as_not_found() {
    let (sim, audit) = simulator(populated(), 0.0, 1);
    let outcome = sim.attempt(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, IdentificationOutcome::NoMatch);
    assert_eq!(audit.entries()[0].result, OperationResult::NotFound);
  }

  #[tokio::test]
  async fn empty_directory_never_matches() {
    let (sim, audit) = simulator(Arc::new(FakeStore::new()), 1.0, 1);
    let outcome = sim.attempt(&CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, IdentificationOutcome::NoMatch);
    assert_eq!(audit.entries()[0].result, OperationResult::NotFound);
  }

  #[tokio::test]
  async fn store_errors_are_logged_and_propagate() {
    let store = populated();
    store.fail_list.store(true, Ordering::SeqCst);
    let (sim, audit) = simulator(store, 1.0, 1);
    assert!(sim.attempt(&CancellationToken::new()).await.is_err());
    assert_eq!(audit.entries()[0].result, OperationResult::Error);
  }

  #[tokio::test]
  async fn cancelled_before_start_logs_nothing() {
    let (sim, audit) = simulator(populated(), 1.0, 1);
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(sim.attempt(&cancel).await, Err(Error::Cancelled)));
    assert!(audit.is_empty());
  }

  #[tokio::test]
  async fn success_rate_converges() {
    let (sim, audit) = simulator(populated(), DEFAULT_SUCCESS_PROBABILITY, 42);
    let cancel = CancellationToken::new();
    let runs = 2000;
    let mut matches = 0;
    for _ in 0..runs {
      if let IdentificationOutcome::Match(_) = sim.attempt(&cancel).await.unwrap() {
        matches += 1;
      }
    }
    let rate = f64::from(matches) / f64::from(runs);
    assert!((rate - 0.8).abs() < 0.04, "observed rate {rate}");
    // The log is capped, so only the newest attempts remain.
    assert_eq!(audit.len(), 1000);
  }

  #[test]
  fn probability_is_clamped() {
    let (sim, _) = simulator(populated(), 1.5, 1);
    assert_eq!(sim.success_probability(), 1.0);
    let (sim, _) = simulator(populated(), f64::NAN, 1);
    assert_eq!(sim.success_probability(), 0.0);
  }
}
