//! Flat-file post storage: one JSON document per post.
//!
//! The simplest durable backend. Post ids double as file stems, which is
//! safe because generated ids are plain decimal tokens; ids arriving from
//! outside are still checked against path traversal.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::application::repos::{PostStore, RepoError};
use crate::domain::posts::Post;

pub struct FsPostStore {
    root: PathBuf,
}

impl FsPostStore {
    /// Open (and create if missing) a post directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn post_path(&self, id: &str) -> Result<PathBuf, RepoError> {
        if id.is_empty()
            || id.contains("..")
            || id.chars().any(|ch| matches!(ch, '/' | '\\'))
        {
            return Err(RepoError::InvalidPath);
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

#[async_trait]
impl PostStore for FsPostStore {
    async fn load_all(&self) -> Result<Vec<Post>, RepoError> {
        let mut posts = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(RepoError::from_persistence)?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(RepoError::from_persistence)?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read(&path).await.map_err(RepoError::from_persistence)?;
            let post = serde_json::from_slice(&raw).map_err(|err| {
                RepoError::Serialization(format!("{}: {err}", path.display()))
            })?;
            posts.push(post);
        }

        Ok(posts)
    }

    async fn persist(&self, post: &Post) -> Result<(), RepoError> {
        let path = self.post_path(&post.id)?;
        let body = serde_json::to_vec_pretty(post)
            .map_err(|err| RepoError::Serialization(err.to_string()))?;
        fs::write(&path, body)
            .await
            .map_err(RepoError::from_persistence)
    }

    async fn remove(&self, id: &str) -> Result<(), RepoError> {
        let path = self.post_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(RepoError::from_persistence(err)),
        }
    }
}
