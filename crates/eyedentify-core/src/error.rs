//! Error types for `eyedentify-core`.

use thiserror::Error;

use crate::{validation::ValidationErrors, wizard::WizardStep};

/// An error raised by a backend behind one of the core ports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid biographic data: {0}")]
  Validation(ValidationErrors),

  #[error("citizen not found: {0}")]
  CitizenNotFound(String),

  #[error("invalid national id: {0:?}")]
  InvalidNationalId(String),

  #[error("photo upload failed: {0}")]
  Upload(#[source] BoxError),

  #[error("record submission failed: {0}")]
  Submission(#[source] BoxError),

  #[error(
    "no operator is registered for user {0}; contact an administrator"
  )]
  OperatorLookup(String),

  #[error("could not allocate a free national id after {attempts} attempts")]
  AllocationExhausted { attempts: u32 },

  #[error("the {requested} step is not available; complete {redirect} first")]
  StepUnavailable {
    requested: WizardStep,
    redirect:  WizardStep,
  },

  #[error("this enrollment has already finished; start a new one")]
  RunFinished,

  #[error("operation cancelled")]
  Cancelled,

  #[error("authentication failed: {0}")]
  Auth(String),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("persistence error: {0}")]
  Persistence(#[source] BoxError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn store(
    e: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn persistence(
    e: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Persistence(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
