//! SQLite and on-disk backends for Eyedentify.
//!
//! [`SqliteStore`] implements the record store over [`tokio_rusqlite`], so
//! database access runs on a dedicated thread without blocking the async
//! runtime. [`DiskObjectStorage`] keeps uploaded photos as plain files.

mod blob;
mod encode;
mod schema;
mod store;

pub mod error;

pub use blob::{DiskObjectStorage, content_type_for};
pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
