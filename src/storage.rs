//! Local upload storage.
//!
//! Files live on disk under the uploads directory and are referenced by
//! relative path strings in the database. Disk names get a unique suffix
//! so concurrent uploads of the same file name never collide.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tokio::fs;

use crate::error::{ApiError, ApiResult};

/// A file persisted to the uploads directory
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Unique name on disk
    pub disk_name: String,
    /// Path relative to the process working directory, as stored in the DB
    pub relative_path: String,
    pub size: i64,
}

/// Handle to the uploads directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Open the store, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build a unique on-disk name preserving the original extension,
    /// mirroring the `<field>-<millis>-<random>` upload naming scheme.
    pub fn unique_name(field: &str, original_name: &str) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        let ext = Path::new(original_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        format!("{}-{}-{}{}", field, Utc::now().timestamp_millis(), suffix, ext)
    }

    /// Write file bytes under an optional subdirectory, returning the
    /// stored name and the relative path recorded in the database.
    pub async fn save(
        &self,
        subdir: Option<&str>,
        field: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> std::io::Result<StoredFile> {
        let disk_name = Self::unique_name(field, original_name);

        let dir = match subdir {
            Some(sub) => self.root.join(sub),
            None => self.root.clone(),
        };
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(&disk_name), bytes).await?;

        let relative_path = match subdir {
            Some(sub) => format!("{}/{}/{}", self.root.display(), sub, disk_name),
            None => format!("{}/{}", self.root.display(), disk_name),
        };

        Ok(StoredFile {
            disk_name,
            relative_path,
            size: bytes.len() as i64,
        })
    }

    /// Resolve a client-supplied file name inside the uploads directory.
    ///
    /// The resolved path must stay under the uploads root; anything that
    /// escapes (e.g. `../../etc/passwd`) is rejected with 400 before any
    /// filesystem access happens.
    pub fn resolve(&self, file_name: &str) -> ApiResult<PathBuf> {
        let resolved = lexical_resolve(&self.root.join(file_name));
        let root = lexical_resolve(&self.root);

        if !resolved.starts_with(&root) {
            return Err(ApiError::bad_request("Invalid file path"));
        }
        Ok(resolved)
    }
}

/// Normalize `.` and `..` components without touching the filesystem,
/// matching the behavior of a lexical path resolve.
fn lexical_resolve(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path().join("uploads")).await.unwrap();

        assert!(store.resolve("data.csv").is_ok());
        assert!(store.resolve("../secret.txt").is_err());
        assert!(store.resolve("../../etc/passwd").is_err());
        assert!(store.resolve("nested/../../escape").is_err());
        // Dot segments that stay inside the root are fine
        assert!(store.resolve("./data.csv").is_ok());
        assert!(store.resolve("sub/../data.csv").is_ok());
    }

    #[tokio::test]
    async fn save_writes_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path().join("uploads")).await.unwrap();

        let a = store.save(None, "files", "report.csv", b"a,b\n1,2\n").await.unwrap();
        let b = store.save(None, "files", "report.csv", b"a,b\n3,4\n").await.unwrap();

        assert_ne!(a.disk_name, b.disk_name);
        assert!(a.disk_name.starts_with("files-"));
        assert!(a.disk_name.ends_with(".csv"));
        assert_eq!(a.size, 8);
    }

    #[tokio::test]
    async fn save_under_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path().join("uploads")).await.unwrap();

        let stored = store
            .save(Some("datasets"), "datasets", "cells.json", b"{}")
            .await
            .unwrap();
        assert!(stored.relative_path.contains("datasets/"));
    }
}
