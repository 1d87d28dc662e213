//! Photo storage as plain files under `<root>/<bucket>/<key>`.

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
};

use bytes::Bytes;
use eyedentify_core::store::ObjectStorage;
use tokio::io::AsyncWriteExt as _;
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct DiskObjectStorage {
  root:     PathBuf,
  base_url: String,
}

impl DiskObjectStorage {
  /// `base_url` is the public origin objects are served from, e.g.
  /// `http://localhost:8080`.
  pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
    Self {
      root:     root.into(),
      base_url: base_url.into().trim_end_matches('/').to_owned(),
    }
  }

  pub fn root(&self) -> &Path { &self.root }

  /// Resolve `bucket/key` under the root, rejecting anything that could
  /// escape it.
  fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf> {
    let invalid = || Error::InvalidKey(format!("{bucket}/{key}"));
    if !is_segment(bucket) {
      return Err(invalid());
    }
    let mut path = self.root.join(bucket);
    for segment in key.split('/') {
      if !is_segment(segment) {
        return Err(invalid());
      }
      path.push(segment);
    }
    Ok(path)
  }

  /// Write a new object. Existing objects are never overwritten.
  pub async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
    let path = self.path_for(bucket, key)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&path)
      .await
      .map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => Error::ObjectExists(format!("{bucket}/{key}")),
        _ => Error::Io(e),
      })?;
    file.write_all(bytes).await?;
    file.flush().await?;

    debug!(bucket, key, len = bytes.len(), "object stored");
    Ok(())
  }

  /// The object's bytes, or `None` if it does not exist.
  pub async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>> {
    let path = self.path_for(bucket, key)?;
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(Bytes::from(bytes))),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(Error::Io(e)),
    }
  }
}

/// Non-empty, not `.` or `..`, and only `[A-Za-z0-9._-]`.
fn is_segment(s: &str) -> bool {
  !s.is_empty()
    && s != "."
    && s != ".."
    && s
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// MIME type for a stored object, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
  match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
    Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
    Some(ext) if ext == "png" => "image/png",
    Some(ext) if ext == "webp" => "image/webp",
    _ => "application/octet-stream",
  }
}

impl ObjectStorage for DiskObjectStorage {
  type Error = Error;

  async fn upload(
    &self,
    bucket: &str,
    key: &str,
    bytes: Bytes,
    _content_type: &str,
  ) -> Result<String> {
    self.put(bucket, key, &bytes).await?;
    Ok(self.public_url(bucket, key))
  }

  fn public_url(&self, bucket: &str, key: &str) -> String {
    format!("{}/storage/{bucket}/{key}", self.base_url)
  }
}

#[cfg(test)]
mod tests {
  use eyedentify_core::store::StoreError;

  use super::*;

  fn storage(dir: &tempfile::TempDir) -> DiskObjectStorage {
    DiskObjectStorage::new(dir.path(), "http://localhost:8080/")
  }

  #[tokio::test]
  async fn upload_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let s = storage(&dir);
    let url = s
      .upload("photos-cni", "a.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
      .await
      .unwrap();
    assert_eq!(url, "http://localhost:8080/storage/photos-cni/a.jpg");
    assert_eq!(s.get("photos-cni", "a.jpg").await.unwrap().unwrap(), "jpeg");
    assert!(dir.path().join("photos-cni/a.jpg").exists());
  }

  #[tokio::test]
  async fn never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let s = storage(&dir);
    s.put("photos-cni", "a.jpg", b"one").await.unwrap();
    let err = s.put("photos-cni", "a.jpg", b"two").await.unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(s.get("photos-cni", "a.jpg").await.unwrap().unwrap(), "one");
  }

  #[tokio::test]
  async fn rejects_path_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let s = storage(&dir);
    for (bucket, key) in [
      ("photos-cni", "../escape.jpg"),
      ("..", "x.jpg"),
      ("photos-cni", "a//b.jpg"),
      ("photos-cni", "/etc/passwd"),
      ("photos-cni", ""),
    ] {
      let err = s.put(bucket, key, b"x").await.unwrap_err();
      assert!(err.is_invalid_query(), "{bucket}/{key} accepted");
    }
  }

  #[tokio::test]
  async fn missing_objects_are_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(storage(&dir).get("photos-cni", "nope.jpg").await.unwrap().is_none());
  }

  #[test]
  fn content_types() {
    assert_eq!(content_type_for("a.JPG"), "image/jpeg");
    assert_eq!(content_type_for("a.png"), "image/png");
    assert_eq!(content_type_for("noext"), "application/octet-stream");
  }
}
