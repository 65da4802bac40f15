// ============================
// livecast-backend-lib/src/storage.rs
// ============================
//! Segment-directory storage with a flat-file implementation.
//!
//! Every stream owns `<root>/<name>/`, written by the ingestion process and
//! read back here to regenerate its playlist.
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs as tokio_fs;
use tracing::debug;

use crate::error::AppError;

/// Trait for segment storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Directory holding a stream's segments and playlist
    fn stream_dir(&self, name: &str) -> PathBuf;

    /// Empty the stream directory, creating it when absent
    async fn prepare_stream_dir(&self, name: &str) -> Result<(), AppError>;

    /// File names in the stream directory ending with `extension`
    async fn list_segments(&self, name: &str, extension: &str) -> Result<Vec<String>, AppError>;

    /// Replace `file_name` in the stream directory without exposing a partial file
    async fn write_playlist(
        &self,
        name: &str,
        file_name: &str,
        contents: &str,
    ) -> Result<PathBuf, AppError>;
}

/// Flat-file implementation of the Storage trait
#[derive(Clone, Debug)]
pub struct FlatFileStorage {
    root: PathBuf,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Storage for FlatFileStorage {
    fn stream_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn prepare_stream_dir(&self, name: &str) -> Result<(), AppError> {
        let dir = self.stream_dir(name);

        let mut entries = match tokio_fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio_fs::create_dir_all(&dir).await?;
                open_permissions(&dir).await?;
                debug!(dir = %dir.display(), "created stream directory");
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio_fs::remove_dir_all(&path).await?;
            } else {
                tokio_fs::remove_file(&path).await?;
            }
            removed += 1;
        }
        debug!(dir = %dir.display(), removed, "cleared stream directory");
        Ok(())
    }

    async fn list_segments(&self, name: &str, extension: &str) -> Result<Vec<String>, AppError> {
        let mut entries = tokio_fs::read_dir(self.stream_dir(name)).await?;
        let mut segments = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(file_name) = entry.file_name().to_str() {
                if file_name.ends_with(extension) {
                    segments.push(file_name.to_string());
                }
            }
        }
        Ok(segments)
    }

    async fn write_playlist(
        &self,
        name: &str,
        file_name: &str,
        contents: &str,
    ) -> Result<PathBuf, AppError> {
        let dir = self.stream_dir(name);
        let target = dir.join(file_name);
        let contents = contents.to_owned();

        let written = target.clone();
        tokio::task::spawn_blocking(move || -> Result<(), AppError> {
            // temp file in the same directory so the rename stays on one filesystem
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(contents.as_bytes())?;
            tmp.as_file().sync_all()?;
            readable_permissions(tmp.as_file())?;
            tmp.persist(&written).map_err(|e| AppError::Storage(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("playlist writer panicked: {e}")))??;

        Ok(target)
    }
}

#[cfg(unix)]
async fn open_permissions(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // the ingestion process writes here under its own user
    tokio_fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)).await
}

#[cfg(not(unix))]
async fn open_permissions(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn readable_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn readable_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_creates_missing_dir() {
        let temp = TempDir::new().unwrap();
        let storage = FlatFileStorage::new(temp.path());

        storage.prepare_stream_dir("alpha").await.unwrap();
        assert!(temp.path().join("alpha").is_dir());
    }

    #[tokio::test]
    async fn test_prepare_clears_existing_contents() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("alpha");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("1.ts"), b"x").unwrap();
        std::fs::write(dir.join("nested/2.ts"), b"y").unwrap();

        let storage = FlatFileStorage::new(temp.path());
        storage.prepare_stream_dir("alpha").await.unwrap();

        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_prepare_reports_other_failures() {
        let temp = TempDir::new().unwrap();
        // a regular file where the directory should be
        std::fs::write(temp.path().join("alpha"), b"not a dir").unwrap();

        let storage = FlatFileStorage::new(temp.path());
        let err = storage.prepare_stream_dir("alpha").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(!err.is_not_found_io());
    }

    #[tokio::test]
    async fn test_list_segments_filters_extension() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("alpha");
        std::fs::create_dir_all(dir.join("sub.ts")).unwrap();
        for name in ["1.ts", "2.ts", "index.m3u8", "notes.txt"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let storage = FlatFileStorage::new(temp.path());
        let mut segments = storage.list_segments("alpha", ".ts").await.unwrap();
        segments.sort();
        assert_eq!(segments, vec!["1.ts".to_string(), "2.ts".to_string()]);
    }

    #[tokio::test]
    async fn test_list_segments_missing_dir() {
        let temp = TempDir::new().unwrap();
        let storage = FlatFileStorage::new(temp.path());
        let err = storage.list_segments("ghost", ".ts").await.unwrap_err();
        assert!(err.is_not_found_io());
    }

    #[tokio::test]
    async fn test_write_playlist_replaces_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("alpha");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.m3u8"), "old").unwrap();

        let storage = FlatFileStorage::new(temp.path());
        let path = storage.write_playlist("alpha", "index.m3u8", "new").await.unwrap();

        assert_eq!(path, dir.join("index.m3u8"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        // no temp files left behind
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
    }
}
