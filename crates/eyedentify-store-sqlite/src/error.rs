//! Error type for `eyedentify-store-sqlite`.

use eyedentify_core::store::StoreError;
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] eyedentify_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("unknown column: {0:?}")]
  UnknownColumn(String),

  #[error("invalid object path: {0:?}")]
  InvalidKey(String),

  #[error("object already exists: {0}")]
  ObjectExists(String),

  #[error("stored sequence out of range: {0}")]
  SequenceOutOfRange(i64),
}

impl Error {
  fn sqlite_failure(&self) -> Option<&ffi::Error> {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => Some(e),
      _ => None,
    }
  }
}

impl StoreError for Error {
  fn is_unique_violation(&self) -> bool {
    matches!(self, Self::ObjectExists(_))
      || self
        .sqlite_failure()
        .is_some_and(|e| e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE)
  }

  fn is_invalid_query(&self) -> bool {
    matches!(self, Self::UnknownColumn(_) | Self::InvalidKey(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
