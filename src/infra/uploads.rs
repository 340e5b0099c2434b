//! Filesystem-backed binary object storage for post assets.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::application::repos::{FileStore, RepoError};

/// Errors that can occur while interacting with the upload storage backend.
#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<UploadStorageError> for RepoError {
    fn from(err: UploadStorageError) -> Self {
        match err {
            UploadStorageError::InvalidPath => RepoError::InvalidPath,
            UploadStorageError::Io(err) => RepoError::from_persistence(err),
        }
    }
}

/// Result of storing an upload payload.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Filesystem-backed upload storage.
///
/// Stored paths are dated and carry a UUID discriminator, so the same
/// filename can be stored any number of times without collisions. The
/// public base (for example `/media`) is prepended when the path is handed
/// back as an HTML `src` reference.
#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
    public_base: String,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if
    /// necessary.
    pub fn new(
        root: impl Into<PathBuf>,
        public_base: impl Into<String>,
    ) -> Result<Self, std::io::Error> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Store the provided payload and return metadata describing the
    /// stored asset.
    pub async fn store(
        &self,
        original_name: &str,
        suffix: Option<&str>,
        data: &[u8],
    ) -> Result<StoredUpload, UploadStorageError> {
        let stored_path = self.build_stored_path(original_name, suffix);
        let absolute = self.resolve(&stored_path)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(StoredUpload {
            stored_path,
            checksum: hex::encode(Sha256::digest(data)),
            size_bytes: data.len() as u64,
        })
    }

    /// Attempt to read the stored payload into memory.
    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the stored payload. Missing files are treated as success.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    /// The reference string embedded in post content for a stored path.
    pub fn public_url(&self, stored_path: &str) -> String {
        format!("{}/{stored_path}", self.public_base)
    }

    /// Resolve the absolute filesystem path for a stored upload.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }

    fn build_stored_path(&self, original_name: &str, suffix: Option<&str>) -> String {
        let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
        let directory = format!("{year}/{:02}/{:02}", month as u8, day);
        let identifier = Uuid::new_v4();
        let filename = sanitize_filename(original_name, suffix);
        format!("{directory}/{identifier}-{filename}")
    }
}

#[async_trait]
impl FileStore for UploadStorage {
    async fn save_file(
        &self,
        bytes: Bytes,
        file_name: &str,
        suffix: Option<&str>,
    ) -> Result<String, RepoError> {
        let stored = self.store(file_name, suffix, &bytes).await?;
        Ok(self.public_url(&stored.stored_path))
    }
}

fn sanitize_filename(original: &str, suffix: Option<&str>) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("upload");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "upload".to_string();
    }

    if let Some(suffix) = suffix.map(str::trim).filter(|value| !value.is_empty()) {
        base = format!("{base}-{}", slugify(suffix));
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_reads_back_a_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path(), "/media").expect("storage");

        let stored = storage
            .store("Weekend Photo.PNG", None, b"payload")
            .await
            .expect("store");

        assert!(stored.stored_path.ends_with("-weekend-photo.png"));
        assert_eq!(stored.size_bytes, 7);
        let read_back = storage.read(&stored.stored_path).await.expect("read");
        assert_eq!(read_back.as_ref(), b"payload");

        let url = storage.public_url(&stored.stored_path);
        assert!(url.starts_with("/media/"));
        assert!(url.ends_with("-weekend-photo.png"));
    }

    #[tokio::test]
    async fn repeated_stores_of_the_same_name_never_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path(), "/media").expect("storage");

        let first = storage.store("pic.png", None, b"a").await.expect("store");
        let second = storage.store("pic.png", None, b"b").await.expect("store");
        assert_ne!(first.stored_path, second.stored_path);
    }

    #[tokio::test]
    async fn suffix_lands_before_the_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path(), "/media").expect("storage");

        let stored = storage
            .store("pic.png", Some("thumb"), b"a")
            .await
            .expect("store");
        assert!(stored.stored_path.ends_with("-pic-thumb.png"));
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path(), "/media").expect("storage");

        let err = storage.read("../outside").await.expect_err("must fail");
        assert!(matches!(err, UploadStorageError::InvalidPath));
    }
}
