//! The in-progress enrollment draft and the session-scoped store it lives in.

use std::{
  collections::HashMap,
  fmt,
  sync::{PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, iris::IrisCapture, validation::BiographicData};

/// Identifies one operator session (one wizard "tab").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
  pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for SessionId {
  fn default() -> Self { Self::new() }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// Where the uploaded enrollment photo ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
  pub key: String,
  pub url: String,
}

/// Everything collected so far in one wizard run. Each section is present
/// only once its step has completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentDraft {
  pub started_at: DateTime<Utc>,
  pub biographic: Option<BiographicData>,
  pub photo:      Option<PhotoRef>,
  pub iris:       Option<IrisCapture>,
}

impl EnrollmentDraft {
  pub fn new(started_at: DateTime<Utc>) -> Self {
    Self { started_at, biographic: None, photo: None, iris: None }
  }
}

/// Persistence port for drafts, keyed by session.
pub trait DraftStore: Send + Sync {
  fn load(&self, session: SessionId) -> Result<Option<EnrollmentDraft>>;
  fn save(&self, session: SessionId, draft: &EnrollmentDraft) -> Result<()>;
  fn clear(&self, session: SessionId) -> Result<()>;
}

/// Process-local draft storage. Drafts disappear with the process, the way a
/// browser tab's session storage does.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
  drafts: RwLock<HashMap<SessionId, EnrollmentDraft>>,
}

impl MemoryDraftStore {
  pub fn new() -> Self { Self::default() }
}

impl DraftStore for MemoryDraftStore {
  fn load(&self, session: SessionId) -> Result<Option<EnrollmentDraft>> {
    let drafts = self.drafts.read().unwrap_or_else(PoisonError::into_inner);
    Ok(drafts.get(&session).cloned())
  }

  fn save(&self, session: SessionId, draft: &EnrollmentDraft) -> Result<()> {
    let mut drafts = self.drafts.write().unwrap_or_else(PoisonError::into_inner);
    drafts.insert(session, draft.clone());
    Ok(())
  }

  fn clear(&self, session: SessionId) -> Result<()> {
    let mut drafts = self.drafts.write().unwrap_or_else(PoisonError::into_inner);
    drafts.remove(&session);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drafts_are_scoped_per_session() {
    let store = MemoryDraftStore::new();
    let (a, b) = (SessionId::new(), SessionId::new());
    store.save(a, &EnrollmentDraft::new(Utc::now())).unwrap();

    assert!(store.load(a).unwrap().is_some());
    assert!(store.load(b).unwrap().is_none());

    store.clear(a).unwrap();
    assert!(store.load(a).unwrap().is_none());
  }

  #[test]
  fn draft_serializes() {
    let draft = EnrollmentDraft {
      photo: Some(PhotoRef { key: "k.jpg".into(), url: "http://x/k.jpg".into() }),
      ..EnrollmentDraft::new(Utc::now())
    };
    let json = serde_json::to_string(&draft).unwrap();
    let back: EnrollmentDraft = serde_json::from_str(&json).unwrap();
    assert_eq!(back, draft);
  }
}
