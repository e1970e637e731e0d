//! Artifact store: on-disk staging for uploads, generated PDFs, and
//! rasterized pages.
//!
//! The store is a single flat directory shared across concurrent jobs.
//! Uniqueness of generated names is the only mutual-exclusion mechanism:
//! every writer gets its own name from [`ArtifactStore::unique_name`]
//! (Unix-millis timestamp plus a process-wide counter), so no locking is
//! needed.
//!
//! References handed to callers are bare file names relative to the store
//! root, never absolute paths — the raw bytes stay behind the store API.
//! Deletion is idempotent: deleting a reference that is already gone is Ok,
//! so a single [`ArtifactStore::cleanup`] call works even when the request
//! that created the assets failed midway.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::error::Snap2TexError;

/// Process-wide sequence number backing [`ArtifactStore::unique_name`].
static NAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// A filesystem-backed artifact owned by one request.
///
/// Holds only the store reference; the owning request passes the collected
/// references to [`ArtifactStore::cleanup`] when it no longer needs them.
/// Nothing is garbage-collected implicitly.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TempAsset {
    reference: String,
}

impl TempAsset {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }

    /// Store-relative reference of this asset.
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

/// Manages the staging directory for derived artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Snap2TexError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Snap2TexError::Store {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Produce a store-unique file name `"{prefix}-{millis}-{seq}.{ext}"`.
    ///
    /// The timestamp orders names across restarts; the atomic counter keeps
    /// them unique within a process even when two jobs ask in the same
    /// millisecond.
    pub fn unique_name(&self, prefix: &str, ext: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{millis}-{seq}.{ext}")
    }

    /// Absolute path for a reference, rejecting traversal attempts.
    pub fn path_of(&self, reference: &str) -> Result<PathBuf, Snap2TexError> {
        if reference.is_empty()
            || reference.contains('/')
            || reference.contains('\\')
            || reference.contains("..")
        {
            return Err(Snap2TexError::InvalidReference {
                reference: reference.to_string(),
            });
        }
        Ok(self.root.join(reference))
    }

    /// Write `bytes` under `reference`, overwriting any previous content.
    pub async fn save(&self, reference: &str, bytes: &[u8]) -> Result<(), Snap2TexError> {
        let path = self.path_of(reference)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Snap2TexError::Store {
                path: path.clone(),
                source: e,
            })?;
        debug!("Stored artifact '{}' ({} bytes)", reference, bytes.len());
        Ok(())
    }

    /// Read the bytes stored under `reference`.
    pub async fn read(&self, reference: &str) -> Result<Vec<u8>, Snap2TexError> {
        let path = self.path_of(reference)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Snap2TexError::Store {
                path: path.clone(),
                source: e,
            })
    }

    /// Whether an artifact exists for `reference`.
    pub async fn exists(&self, reference: &str) -> bool {
        match self.path_of(reference) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Delete the artifact under `reference`. Deleting a reference that does
    /// not exist is Ok — cleanup must be callable twice.
    pub async fn delete(&self, reference: &str) -> Result<(), Snap2TexError> {
        let path = self.path_of(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Snap2TexError::Store { path, source: e }),
        }
    }

    /// Best-effort deletion of every listed reference.
    ///
    /// Invalid references and already-deleted files are skipped with a
    /// warning; returns the number of files actually removed.
    pub async fn cleanup(&self, references: &[TempAsset]) -> usize {
        let mut removed = 0;
        for asset in references {
            match self.delete(asset.reference()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Cleanup skipped '{}': {}", asset.reference(), e),
            }
        }
        debug!("Cleanup removed {}/{} artifacts", removed, references.len());
        removed
    }

    /// Move a file produced outside the store (e.g. an engine's scratch
    /// output) into the store under `reference`.
    ///
    /// Rename first; falls back to copy-and-remove when the scratch
    /// directory lives on a different filesystem.
    pub async fn adopt(&self, src: &Path, reference: &str) -> Result<(), Snap2TexError> {
        let dst = self.path_of(reference)?;
        if tokio::fs::rename(src, &dst).await.is_ok() {
            return Ok(());
        }
        tokio::fs::copy(src, &dst)
            .await
            .map_err(|e| Snap2TexError::Store {
                path: dst.clone(),
                source: e,
            })?;
        if let Err(e) = tokio::fs::remove_file(src).await {
            warn!("Could not remove scratch file {}: {}", src.display(), e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn unique_names_do_not_collide() {
        let (_dir, store) = temp_store();
        let a = store.unique_name("doc", "pdf");
        let b = store.unique_name("doc", "pdf");
        assert_ne!(a, b);
        assert!(a.starts_with("doc-") && a.ends_with(".pdf"));
    }

    #[test]
    fn rejects_traversal_references() {
        let (_dir, store) = temp_store();
        assert!(store.path_of("../etc/passwd").is_err());
        assert!(store.path_of("a/b.pdf").is_err());
        assert!(store.path_of("").is_err());
        assert!(store.path_of("plain.pdf").is_ok());
    }

    #[tokio::test]
    async fn save_read_delete_roundtrip() {
        let (_dir, store) = temp_store();
        store.save("x.pdf", b"pdf bytes").await.unwrap();
        assert!(store.exists("x.pdf").await);
        assert_eq!(store.read("x.pdf").await.unwrap(), b"pdf bytes");
        store.delete("x.pdf").await.unwrap();
        assert!(!store.exists("x.pdf").await);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = temp_store();
        store.delete("never-existed.pdf").await.unwrap();
        store.save("y.png", b"img").await.unwrap();
        store.delete("y.png").await.unwrap();
        store.delete("y.png").await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_counts_only_real_removals() {
        let (_dir, store) = temp_store();
        store.save("a.png", b"1").await.unwrap();
        store.save("b.png", b"2").await.unwrap();
        let assets = vec![
            TempAsset::new("a.png"),
            TempAsset::new("b.png"),
            TempAsset::new("a.png"), // second delete of the same ref is Ok
        ];
        let removed = store.cleanup(&assets).await;
        assert_eq!(removed, 3); // idempotent deletes all report Ok
        assert!(!store.exists("a.png").await);
        assert!(!store.exists("b.png").await);
    }

    #[tokio::test]
    async fn adopt_moves_file_into_store() {
        let (_dir, store) = temp_store();
        let scratch = tempfile::tempdir().unwrap();
        let src = scratch.path().join("out.pdf");
        tokio::fs::write(&src, b"%PDF-1.7").await.unwrap();
        store.adopt(&src, "final.pdf").await.unwrap();
        assert!(store.exists("final.pdf").await);
        assert!(!src.exists());
    }
}
