//! In-memory adapters for tests and embedded use.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::application::repos::{FileStore, PostStore, RepoError};
use crate::domain::posts::{Post, eq_ignore_case};

/// Post storage that never leaves the process. Useful as a cache-warmup
/// fixture and for callers that want a fully ephemeral blog.
#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<HashMap<String, Post>>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert posts directly, bypassing the engine. Intended for seeding
    /// fixtures before a cache warms up.
    pub async fn seed(&self, posts: impl IntoIterator<Item = Post>) {
        let mut guard = self.posts.lock().await;
        for post in posts {
            guard.insert(post.id.clone(), post);
        }
    }

    pub async fn len(&self) -> usize {
        self.posts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.lock().await.is_empty()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn load_all(&self) -> Result<Vec<Post>, RepoError> {
        Ok(self.posts.lock().await.values().cloned().collect())
    }

    async fn persist(&self, post: &Post) -> Result<(), RepoError> {
        let mut guard = self.posts.lock().await;
        guard.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RepoError> {
        let mut guard = self.posts.lock().await;
        guard.retain(|key, _| !eq_ignore_case(key, id));
        Ok(())
    }
}

/// Record of one blob handed to a [`MemoryFileStore`].
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub file_name: String,
    pub suffix: Option<String>,
    pub bytes: Bytes,
    pub reference: String,
}

/// File storage that records payloads in memory and returns predictable
/// references.
#[derive(Default)]
pub struct MemoryFileStore {
    saved: Mutex<Vec<SavedFile>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn saved(&self) -> Vec<SavedFile> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn save_file(
        &self,
        bytes: Bytes,
        file_name: &str,
        suffix: Option<&str>,
    ) -> Result<String, RepoError> {
        let mut guard = self.saved.lock().await;
        let reference = format!("/media/{}-{file_name}", guard.len() + 1);
        guard.push(SavedFile {
            file_name: file_name.to_string(),
            suffix: suffix.map(str::to_string),
            bytes,
            reference: reference.clone(),
        });
        Ok(reference)
    }
}
