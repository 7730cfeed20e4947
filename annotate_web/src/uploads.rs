use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create upload directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Reduces a client-supplied file name to a safe basename of ASCII letters,
/// digits, `.`, `-` and `_`.
pub fn secure_filename(name: &str) -> String {
    let basename = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = basename
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Stored file names for one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadNames {
    pub original: String,
    pub marked: String,
}

/// Writes uploaded and generated images below one directory that is served
/// under [`UPLOADS_ROUTE`].
#[derive(Debug)]
pub struct UploadStore {
    directory: PathBuf,
    sequence: AtomicU64,
}

impl UploadStore {
    pub async fn new(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: directory.clone(),
                source,
            })?;
        tracing::info!("Storing uploads in {:?}", directory);

        Ok(Self {
            directory,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Names unique to this upload, so concurrent uploads of the same file
    /// never overwrite each other.
    pub fn names_for(&self, client_name: &str) -> UploadNames {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let safe = secure_filename(client_name);
        let stem = Path::new(&safe)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| safe.clone());

        UploadNames {
            original: format!("original_{}_{}_{}", millis, sequence, safe),
            marked: format!("marked_{}_{}_{}.png", millis, sequence, stem),
        }
    }

    /// Writes `bytes` and returns the URL the file is served at.
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.directory.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        tracing::debug!("Saved {} bytes to {:?}", bytes.len(), path);
        Ok(Self::url_for(file_name))
    }

    pub fn url_for(file_name: &str) -> String {
        format!("{}/{}", UPLOADS_ROUTE, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("cat.jpg"), "cat.jpg");
        assert_eq!(secure_filename("my cat photo.png"), "my_cat_photo.png");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\dog.jpeg"), "dog.jpeg");
        assert_eq!(secure_filename(".hidden.png"), "hidden.png");
        assert_eq!(secure_filename("кошка.png"), "png");
        assert_eq!(secure_filename("..."), "upload");
        assert_eq!(secure_filename(""), "upload");
    }

    #[tokio::test]
    async fn test_names_are_unique_per_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path()).await.unwrap();

        let first = store.names_for("cat.jpg");
        let second = store.names_for("cat.jpg");

        assert_ne!(first, second);
        assert!(first.original.starts_with("original_"));
        assert!(first.original.ends_with("_cat.jpg"));
        assert!(first.marked.starts_with("marked_"));
        assert!(first.marked.ends_with("_cat.png"));
    }

    #[tokio::test]
    async fn test_save_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("nested")).await.unwrap();

        let url = store.save("original_a.png", b"bytes").await.unwrap();

        assert_eq!(url, "/uploads/original_a.png");
        let written = std::fs::read(store.directory().join("original_a.png")).unwrap();
        assert_eq!(written, b"bytes");
    }
}
