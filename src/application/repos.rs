//! Repository traits describing the engine surface and its persistence
//! adapters.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::posts::Post;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid stored path")]
    InvalidPath,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// The privilege oracle's answer for one logical operation.
///
/// Captured once per call and passed explicitly so a single list
/// computation can never observe two different answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Anonymous reader: only visible posts.
    Public,
    /// Authenticated editor: every post, including drafts and future-dated.
    Privileged,
}

impl ListScope {
    pub fn from_privileged(privileged: bool) -> Self {
        if privileged {
            Self::Privileged
        } else {
            Self::Public
        }
    }

    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Privileged)
    }

    /// Whether a post may be shown to a caller operating under this scope.
    pub fn allows(self, post: &Post, now: OffsetDateTime) -> bool {
        self.is_privileged() || post.is_visible(now)
    }
}

/// Caller-facing repository contract, uniform across every backend.
///
/// Lookup misses are `Ok(None)`, never errors. Every listing is ordered by
/// descending publication date.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// All posts the caller may see.
    async fn get_posts(&self, scope: ListScope) -> Result<Vec<Post>, RepoError>;

    /// Windowed variant of [`PostRepository::get_posts`].
    async fn get_posts_window(
        &self,
        scope: ListScope,
        count: usize,
        skip: usize,
    ) -> Result<Vec<Post>, RepoError>;

    /// Posts carrying `category`, matched case-insensitively.
    async fn get_posts_by_category(
        &self,
        scope: ListScope,
        category: &str,
    ) -> Result<Vec<Post>, RepoError>;

    /// Posts carrying `tag`, matched case-insensitively.
    async fn get_posts_by_tag(&self, scope: ListScope, tag: &str) -> Result<Vec<Post>, RepoError>;

    async fn get_post_by_id(&self, scope: ListScope, id: &str)
    -> Result<Option<Post>, RepoError>;

    async fn get_post_by_slug(
        &self,
        scope: ListScope,
        slug: &str,
    ) -> Result<Option<Post>, RepoError>;

    /// Distinct lower-cased categories over posts the caller may see.
    async fn get_categories(&self, scope: ListScope) -> Result<Vec<String>, RepoError>;

    /// Distinct lower-cased tags over posts the caller may see.
    async fn get_tags(&self, scope: ListScope) -> Result<Vec<String>, RepoError>;

    /// Upsert by id. Stamps `last_modified` and re-establishes the
    /// descending publication-date ordering. Returns the stored post.
    async fn save_post(&self, post: Post) -> Result<Post, RepoError>;

    /// Remove the post and every comment it owns.
    async fn delete_post(&self, post: &Post) -> Result<(), RepoError>;

    /// Persist a binary blob and return the reference to embed in content.
    async fn save_file(
        &self,
        bytes: Bytes,
        file_name: &str,
        suffix: Option<&str>,
    ) -> Result<String, RepoError>;
}

/// Durable persistence primitives a backing store must provide. No
/// filtering, ordering, or caching concerns live here.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Load every post (with comments) for cache warm-up.
    async fn load_all(&self) -> Result<Vec<Post>, RepoError>;

    /// Durably write one post, replacing any record with the same id.
    async fn persist(&self, post: &Post) -> Result<(), RepoError>;

    /// Durably remove one post and its comments. Removing an unknown id
    /// is not an error.
    async fn remove(&self, id: &str) -> Result<(), RepoError>;
}

/// Binary object store: receives bytes, returns a stable reference string
/// usable as an HTML `src`.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save_file(
        &self,
        bytes: Bytes,
        file_name: &str,
        suffix: Option<&str>,
    ) -> Result<String, RepoError>;
}
