//! Core types, ports, and workflows for the Eyedentify enrollment system.
//!
//! This crate has no HTTP or database dependencies. Record storage, object
//! storage, authentication, draft persistence, and audit persistence are all
//! reached through the traits in [`store`], [`session`], [`draft`], and
//! [`audit`]; concrete backends live in sibling crates.

#![allow(async_fn_in_trait)]

pub mod allocator;
pub mod audit;
pub mod citizen;
pub mod directory;
pub mod draft;
pub mod error;
pub mod identification;
pub mod iris;
pub mod national_id;
pub mod normalize;
pub mod session;
pub mod store;
pub mod validation;
pub mod wizard;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BoxError, Error, Result};
