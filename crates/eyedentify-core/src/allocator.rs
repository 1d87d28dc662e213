//! Allocation of `SN-<year>-<sequence>` national identity numbers.
//!
//! [`IdentifierAllocator::allocate`] never fails. It asks the store for this
//! year's highest sequence in one server-evaluated query; when that errors it
//! scans every record's ID-like columns; when even the scan errors it derives
//! a sequence from the clock.
//!
//! None of those paths can see a concurrent enrollment that has not been
//! committed yet. The store's UNIQUE constraint on the national ID is the
//! arbiter: [`IdentifierAllocator::insert_with_retry`] re-allocates whenever
//! an insert loses that race.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  citizen::{NewCitizen, RawRecord},
  national_id::NationalId,
  normalize::CanonicalField,
  store::{CitizenStore, StoreError},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Which path produced an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationSource {
  /// The store's server-side maximum.
  Atomic,
  /// A client-side scan over all records.
  Scan,
  /// The millisecond clock. Carries no uniqueness guarantee.
  Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
  pub id:     NationalId,
  pub source: AllocationSource,
}

pub struct IdentifierAllocator<S> {
  store:        Arc<S>,
  max_attempts: u32,
}

impl<S> IdentifierAllocator<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, max_attempts: DEFAULT_MAX_ATTEMPTS }
  }

  pub fn with_max_attempts(mut self, attempts: u32) -> Self {
    self.max_attempts = attempts.max(1);
    self
  }
}

impl<S: CitizenStore> IdentifierAllocator<S> {
  /// Allocate the next identifier for the current local year.
  pub async fn allocate(&self) -> Allocation {
    self.allocate_for_year(Local::now().year()).await
  }

  pub async fn allocate_for_year(&self, year: i32) -> Allocation {
    match self.store.max_sequence_for_year(year).await {
      Ok(max) => {
        return Allocation {
          id:     NationalId::new(year, max.unwrap_or(0).saturating_add(1)),
          source: AllocationSource::Atomic,
        };
      }
      Err(e) => {
        warn!(error = %e, year, "sequence query failed; scanning records")
      }
    }

    match self.store.list_citizens(None).await {
      Ok(rows) => Allocation {
        id:     NationalId::new(
          year,
          max_sequence_in(&rows, year).saturating_add(1),
        ),
        source: AllocationSource::Scan,
      },
      Err(e) => {
        warn!(
          error = %e,
          year,
          "record scan failed; deriving national id from the clock"
        );
        Allocation {
          id:     clock_id(year, Utc::now()),
          source: AllocationSource::Clock,
        }
      }
    }
  }

  /// Allocate an identifier, build the record with it, and insert it.
  ///
  /// On a unique violation the next candidate is strictly greater than every
  /// identifier tried so far. Gives up with [`Error::AllocationExhausted`]
  /// after the configured number of attempts; any other store error is a
  /// [`Error::Submission`]. `cancel` is checked before every attempt.
  pub async fn insert_with_retry<F>(
    &self,
    cancel: &CancellationToken,
    mut build: F,
  ) -> Result<(NationalId, RawRecord)>
  where
    F: FnMut(NationalId) -> NewCitizen + Send,
  {
    let mut highest_tried: Option<NationalId> = None;

    for attempt in 1..=self.max_attempts {
      if cancel.is_cancelled() {
        debug!(attempt, "insert cancelled");
        return Err(Error::Cancelled);
      }
      let mut id = self.allocate().await.id;
      if let Some(prev) = highest_tried
        && prev.year() == id.year()
        && id <= prev
      {
        id = prev.next();
      }

      match self.store.insert_citizen(build(id)).await {
        Ok(row) => {
          info!(national_id = %id, attempt, "citizen record inserted");
          return Ok((id, row));
        }
        Err(e) if e.is_unique_violation() => {
          warn!(national_id = %id, attempt, "national id already taken; re-allocating");
          highest_tried = Some(id);
        }
        Err(e) => return Err(Error::Submission(Box::new(e))),
      }
    }

    Err(Error::AllocationExhausted { attempts: self.max_attempts })
  }
}

/// Highest `year` sequence found in any legacy national-ID column.
pub fn max_sequence_in(rows: &[RawRecord], year: i32) -> u32 {
  let max = rows
    .iter()
    .flat_map(|row| {
      CanonicalField::NationalId
        .aliases()
        .iter()
        .filter_map(move |field| row.get(*field)?.as_str())
    })
    .filter_map(|raw| NationalId::sequence_for_year(raw, year))
    .max()
    .unwrap_or(0);
  debug!(year, rows = rows.len(), max, "scanned records for sequence");
  max
}

/// Sequence from the last six digits of the millisecond clock.
fn clock_id(year: i32, now: DateTime<Utc>) -> NationalId {
  let millis = now.timestamp_millis().rem_euclid(1_000_000);
  NationalId::new(year, u32::try_from(millis).unwrap_or_default())
}
