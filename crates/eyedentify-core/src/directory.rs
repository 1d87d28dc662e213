//! Read access to citizen records.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  citizen::{CitizenRecord, RawRecord, Sex},
  normalize::{CanonicalField, national_id_of, normalize},
  store::CitizenStore,
};

/// Timestamp-like columns tried in turn to order the listing.
pub const ORDER_CANDIDATES: &[&str] = &["enrolled_at", "created_at", "date_enregistrement"];

// ─── Query types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum SortKey {
  /// Most recently enrolled first.
  #[default]
  Date,
  Name,
  NationalId,
}

impl SortKey {
  pub fn next(self) -> Self {
    match self {
      Self::Date => Self::Name,
      Self::Name => Self::NationalId,
      Self::NationalId => Self::Date,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitizenQuery {
  /// Case-insensitive over names and birth place; case-sensitive over the
  /// national ID.
  pub text:                String,
  pub enrolled_today_only: bool,
  pub sort:                SortKey,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
  pub total:          usize,
  pub enrolled_today: usize,
  pub male:           usize,
  pub female:         usize,
}

/// A record with coordinates, ready for a map renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
  pub latitude:    f64,
  pub longitude:   f64,
  pub national_id: String,
  pub label:       String,
}

// ─── Directory ───────────────────────────────────────────────────────────────

pub struct CitizenDirectory<S> {
  store: Arc<S>,
}

impl<S> Clone for CitizenDirectory<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: CitizenStore> CitizenDirectory<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// All raw rows, newest first when any ordering column exists.
  pub async fn list(&self) -> Result<Vec<RawRecord>> {
    for column in ORDER_CANDIDATES {
      match self.store.list_citizens(Some(*column)).await {
        Ok(rows) => {
          debug!(column, rows = rows.len(), "listed citizens");
          return Ok(rows);
        }
        Err(e) => debug!(column, error = %e, "ordering column unavailable"),
      }
    }
    warn!("no ordering column available; listing citizens unordered");
    self.store.list_citizens(None).await.map_err(Error::store)
  }

  /// All records, normalized.
  pub async fn records(&self) -> Result<Vec<CitizenRecord>> {
    let now = Utc::now();
    Ok(self.list().await?.iter().map(|r| normalize(r, now)).collect())
  }

  pub async fn get_by_id(&self, id: &str) -> Result<RawRecord> {
    self
      .store
      .find_citizen("id", id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::CitizenNotFound(id.to_owned()))
  }

  /// Look a record up by national ID, checking every legacy ID column.
  ///
  /// A scan of the full listing runs first; if it errors or misses, each
  /// candidate column is queried directly in turn.
  pub async fn get_by_national_id(&self, national_id: &str) -> Result<RawRecord> {
    let wanted = national_id.trim();
    if wanted.is_empty() {
      return Err(Error::InvalidNationalId(national_id.to_owned()));
    }

    match self.list().await {
      Ok(rows) => {
        if let Some(row) = rows.into_iter().find(|r| has_national_id(r, wanted)) {
          return Ok(row);
        }
      }
      Err(e) => debug!(error = %e, "listing failed; querying id columns directly"),
    }

    for field in CanonicalField::NationalId.aliases().iter().chain(&["id"]) {
      match self.store.find_citizen(field, wanted).await {
        Ok(Some(row)) => return Ok(row),
        Ok(None) => {}
        Err(e) => debug!(field, error = %e, "direct lookup failed"),
      }
    }

    Err(Error::CitizenNotFound(wanted.to_owned()))
  }

  pub async fn count(&self) -> Result<u64> {
    self.store.count_citizens().await.map_err(Error::store)
  }

  pub async fn search(&self, query: &CitizenQuery) -> Result<Vec<CitizenRecord>> {
    Ok(filter_and_sort(self.records().await?, query))
  }

  pub async fn stats(&self) -> Result<DirectoryStats> {
    Ok(stats_of(&self.records().await?))
  }

  pub async fn map_markers(&self) -> Result<Vec<MapMarker>> {
    Ok(markers_of(&self.records().await?))
  }
}

fn has_national_id(row: &RawRecord, wanted: &str) -> bool {
  CanonicalField::NationalId
    .aliases()
    .iter()
    .any(|f| row.get(*f).and_then(|v| v.as_str()).map(str::trim) == Some(wanted))
    || national_id_of(row) == wanted
}

// ─── Pure helpers ────────────────────────────────────────────────────────────

pub fn filter_and_sort(
  records: Vec<CitizenRecord>,
  query: &CitizenQuery,
) -> Vec<CitizenRecord> {
  let term = query.text.trim();
  let lowered = term.to_lowercase();

  let mut matched: Vec<_> = records
    .into_iter()
    .filter(|r| !query.enrolled_today_only || r.enrolled_today)
    .filter(|r| {
      term.is_empty()
        || r.given_names.to_lowercase().contains(&lowered)
        || r.family_name.to_lowercase().contains(&lowered)
        || r.birth_place.to_lowercase().contains(&lowered)
        || r.national_id.contains(term)
    })
    .collect();

  match query.sort {
    SortKey::Date => matched.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at)),
    SortKey::Name => matched.sort_by_cached_key(|r| r.sort_name().to_lowercase()),
    SortKey::NationalId => matched.sort_by(|a, b| a.national_id.cmp(&b.national_id)),
  }
  matched
}

pub fn stats_of(records: &[CitizenRecord]) -> DirectoryStats {
  records.iter().fold(
    DirectoryStats { total: records.len(), ..Default::default() },
    |mut s, r| {
      if r.enrolled_today {
        s.enrolled_today += 1;
      }
      match r.sex {
        Sex::M => s.male += 1,
        Sex::F => s.female += 1,
      }
      s
    },
  )
}

pub fn markers_of(records: &[CitizenRecord]) -> Vec<MapMarker> {
  records
    .iter()
    .filter_map(|r| {
      let (latitude, longitude) = r.coordinates()?;
      Some(MapMarker {
        latitude,
        longitude,
        national_id: r.national_id.clone(),
        label: r.full_name(),
      })
    })
    .collect()
}
