//! Ports onto the record store and object storage.
//!
//! Implemented by `eyedentify-store-sqlite` (directly, in the server) and by
//! the terminal client's HTTP `ApiClient`. Workflows in this crate depend on
//! these traits only.

use std::future::Future;

use bytes::Bytes;

use crate::citizen::{NewCitizen, Operator, RawRecord};

/// Classification hooks every backend error provides.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The write lost to an existing row with the same unique key.
  fn is_unique_violation(&self) -> bool;

  /// The request itself was malformed (e.g. an unknown column name).
  fn is_invalid_query(&self) -> bool { false }
}

// ─── Record store ────────────────────────────────────────────────────────────

/// The `citizens` and `operators` collections.
///
/// Citizens are insert-only: there is no update or delete.
pub trait CitizenStore: Send + Sync + 'static {
  type Error: StoreError;

  /// Highest sequence among `SN-<year>-*` identifiers, evaluated by the store
  /// in a single round trip. `None` when no identifier exists for `year`.
  fn max_sequence_for_year(
    &self,
    year: i32,
  ) -> impl Future<Output = Result<Option<u32>, Self::Error>> + Send + '_;

  /// Every citizen row, ordered by `order_by` descending when given. Fails
  /// when the column does not exist.
  fn list_citizens<'a>(
    &'a self,
    order_by: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<RawRecord>, Self::Error>> + Send + 'a;

  /// The first row whose `field` equals `value`.
  fn find_citizen<'a>(
    &'a self,
    field: &'a str,
    value: &'a str,
  ) -> impl Future<Output = Result<Option<RawRecord>, Self::Error>> + Send + 'a;

  fn count_citizens(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Insert a citizen and return the stored row. A duplicate national ID
  /// fails with an error whose [`StoreError::is_unique_violation`] is true.
  fn insert_citizen(
    &self,
    citizen: NewCitizen,
  ) -> impl Future<Output = Result<RawRecord, Self::Error>> + Send + '_;

  fn find_operator<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<Operator>, Self::Error>> + Send + 'a;
}

// ─── Object storage ──────────────────────────────────────────────────────────

/// Bucketed blob storage for enrollment photos.
pub trait ObjectStorage: Send + Sync + 'static {
  type Error: StoreError;

  /// Store `bytes` under `bucket/key` and return its public URL. Never
  /// overwrites: an existing key is a unique violation.
  fn upload<'a>(
    &'a self,
    bucket: &'a str,
    key: &'a str,
    bytes: Bytes,
    content_type: &'a str,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  fn public_url(&self, bucket: &str, key: &str) -> String;
}
