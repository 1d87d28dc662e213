//! Audit history kept as a JSON array on disk.

use std::{
  ffi::OsString,
  io::ErrorKind,
  path::{Path, PathBuf},
};

use chrono::Utc;
use eyedentify_core::{
  Error, Result,
  audit::{AuditOperation, AuditPersistence},
};
use serde_json::Value;
use tracing::warn;

/// [`AuditPersistence`] over a single JSON file. Saves go through a
/// sibling temp file and a rename, so a crash never leaves half a log.
///
/// History that cannot be read in full is copied to
/// `<file>.corrupt-<timestamp>` before anything is written over it.
pub struct JsonFileAudit {
  path: PathBuf,
}

impl JsonFileAudit {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  fn corrupt_copy_path(&self) -> PathBuf {
    let mut name = OsString::from(self.path.as_os_str());
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
    PathBuf::from(name)
  }

  fn set_aside(&self, raw: &str) -> Result<PathBuf> {
    let copy = self.corrupt_copy_path();
    std::fs::write(&copy, raw).map_err(Error::persistence)?;
    Ok(copy)
  }
}

impl AuditPersistence for JsonFileAudit {
  /// Entries that fail to parse are skipped; the file as found is kept
  /// aside first. A file that is not a JSON array at all is moved aside and
  /// reported as an error.
  fn load(&self) -> Result<Vec<AuditOperation>> {
    let raw = match std::fs::read_to_string(&self.path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(Error::persistence(e)),
    };
    if raw.trim().is_empty() {
      return Ok(Vec::new());
    }

    let values: Vec<Value> = match serde_json::from_str(&raw) {
      Ok(values) => values,
      Err(e) => {
        let copy = self.set_aside(&raw)?;
        std::fs::remove_file(&self.path).map_err(Error::persistence)?;
        warn!(error = %e, kept = %copy.display(), "audit history unreadable");
        return Err(e.into());
      }
    };

    let total = values.len();
    let entries: Vec<AuditOperation> = values
      .into_iter()
      .enumerate()
      .filter_map(|(index, value)| {
        serde_json::from_value(value)
          .inspect_err(|e| warn!(index, error = %e, "skipping audit entry"))
          .ok()
      })
      .collect();

    if entries.len() < total {
      let copy = self.set_aside(&raw)?;
      warn!(
        skipped = total - entries.len(),
        kept = %copy.display(),
        "audit history partly unreadable"
      );
    }
    Ok(entries)
  }

  fn save(&self, entries: &[AuditOperation]) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent).map_err(Error::persistence)?;
    }
    let tmp = self.path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(entries)?;
    std::fs::write(&tmp, body).map_err(Error::persistence)?;
    std::fs::rename(&tmp, &self.path).map_err(Error::persistence)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use eyedentify_core::audit::{
    AuditLog, NewOperation, OperationResult, OperationType,
  };

  use super::*;

  #[test]
  fn missing_file_is_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let audit = JsonFileAudit::new(dir.path().join("audit.json"));
    assert!(audit.load().unwrap().is_empty());
  }

  #[test]
  fn history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("audit.json");

    let log = AuditLog::open(Arc::new(JsonFileAudit::new(&path)));
    log.append(
      NewOperation::new(
        OperationType::Enrollment,
        "Mariama Diallo",
        OperationResult::Success,
      )
      .national_id("SN-2025-000001")
      .duration_secs(42.5),
    );
    log.append(NewOperation::new(
      OperationType::Identification,
      "Mariama Diallo",
      OperationResult::NotFound,
    ));
    assert!(!path.with_extension("json.tmp").exists());

    let reopened = AuditLog::open(Arc::new(JsonFileAudit::new(&path)));
    assert_eq!(reopened.entries(), log.entries());
  }

  #[test]
  fn reads_legacy_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.json");
    std::fs::write(
      &path,
      r#"[{
        "id": "5f0c6d8e-8a4b-4c1e-9d2a-3b7e1f0a9c11",
        "date": "2025-01-15T09:30:00Z",
        "type": "Enrôlement",
        "agent": "Agent Diop",
        "result": "succès",
        "citizenCni": "SN-2025-000042",
        "duration": 312
      }, {
        "id": "0e6a1f3b-2c4d-4e5f-8a9b-1c2d3e4f5a6b",
        "date": "2025-01-15T10:00:00Z",
        "type": "Identification",
        "agent": "Agent Diop",
        "result": "non trouvé"
      }]"#,
    )
    .unwrap();

    let entries = JsonFileAudit::new(&path).load().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, OperationType::Enrollment);
    assert_eq!(entries[0].result, OperationResult::Success);
    assert_eq!(entries[0].national_id.as_deref(), Some("SN-2025-000042"));
    assert_eq!(entries[0].duration_secs, Some(312.0));
    assert_eq!(entries[1].result, OperationResult::NotFound);
  }

  fn corrupt_copies(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().path())
      .filter(|p| p.to_string_lossy().contains("audit.json.corrupt-"))
      .collect()
  }

  #[test]
  fn corrupt_file_is_set_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.json");
    std::fs::write(&path, "{not json").unwrap();

    assert!(JsonFileAudit::new(&path).load().is_err());
    assert!(!path.exists());
    let copies = corrupt_copies(dir.path());
    assert_eq!(copies.len(), 1);
    assert_eq!(std::fs::read_to_string(&copies[0]).unwrap(), "{not json");
  }

  #[test]
  fn unreadable_entry_does_not_cost_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.json");
    let seeded = r#"[{
        "id": "5f0c6d8e-8a4b-4c1e-9d2a-3b7e1f0a9c11",
        "date": "2025-01-15T09:30:00Z",
        "type": "Enrôlement",
        "agent": "Agent Diop",
        "result": "succès",
        "citizenCni": "SN-2025-000042"
      }, {
        "id": "0e6a1f3b-2c4d-4e5f-8a9b-1c2d3e4f5a6b",
        "date": "2025-01-15T10:00:00Z",
        "type": "Identification",
        "agent": "Agent Diop",
        "result": "inconnu"
      }]"#;
    std::fs::write(&path, seeded).unwrap();

    let log = AuditLog::open(Arc::new(JsonFileAudit::new(&path)));
    assert_eq!(log.len(), 1);
    log.append(NewOperation::new(
      OperationType::Identification,
      "Agent Diop",
      OperationResult::NotFound,
    ));

    let on_disk = JsonFileAudit::new(&path).load().unwrap();
    assert_eq!(on_disk.len(), 2);
    assert_eq!(on_disk[0].national_id.as_deref(), Some("SN-2025-000042"));

    let copies = corrupt_copies(dir.path());
    assert_eq!(copies.len(), 1);
    assert_eq!(std::fs::read_to_string(&copies[0]).unwrap(), seeded);
  }
}
