//! The cached repository: a write-through decorator over any backing
//! store, answering every read from an in-memory snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::application::content::{self, ContentError};
use crate::application::pagination::{self, PostPage};
use crate::application::repos::{FileStore, ListScope, PostRepository, PostStore, RepoError};
use crate::config::BlogConfig;
use crate::domain::error::DomainError;
use crate::domain::posts::{Comment, Post, eq_ignore_case};
use crate::domain::slug::{create_slug_default, timestamp_suffix};

#[derive(Debug, Error)]
pub enum BlogError {
    #[error("post `{id}` not found")]
    PostNotFound { id: String },
    #[error("comments are closed for post `{id}`")]
    CommentsClosed { id: String },
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Editor input for creating or updating a post.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    /// Existing post id, or `None` for a new post.
    pub id: Option<String>,
    pub title: String,
    /// Explicit slug; derived from the title when empty.
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: String,
    pub is_published: bool,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// Reader input for a new comment. `website` is the honeypot field: real
/// forms keep it hidden and empty, so its mere presence marks a bot.
#[derive(Debug, Clone)]
pub struct CommentSubmission {
    pub author: String,
    pub content: String,
    pub email: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentOutcome {
    Accepted(Comment),
    /// Honeypot tripped; nothing was persisted and no error is raised.
    Discarded,
}

/// Snapshot lifecycle. The backing store is only read in `Cold`; once
/// `Ready`, every read is served from memory.
enum CacheState {
    Cold,
    Warming,
    Ready(Vec<Post>),
}

/// Caching decorator over a [`PostStore`] and a [`FileStore`].
///
/// Reads clone from the sorted snapshot under a read lock. Mutations hold
/// the write lock across "persist to store, then update and re-sort the
/// snapshot", so a failed store write leaves the cache untouched and
/// readers never observe a partially-updated list. File persistence
/// bypasses the lock entirely.
pub struct CachedBlog {
    store: Arc<dyn PostStore>,
    files: Arc<dyn FileStore>,
    cache: RwLock<CacheState>,
}

impl CachedBlog {
    pub fn new(store: Arc<dyn PostStore>, files: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            files,
            cache: RwLock::new(CacheState::Cold),
        }
    }

    /// Run `read` against the warm snapshot, warming it first if needed.
    async fn with_snapshot<T>(&self, read: impl FnOnce(&[Post]) -> T) -> Result<T, RepoError> {
        {
            let guard = self.cache.read().await;
            if let CacheState::Ready(posts) = &*guard {
                return Ok(read(posts));
            }
        }

        let mut guard = self.cache.write().await;
        let posts = Self::ready_posts(&mut *guard, self.store.as_ref()).await?;
        Ok(read(posts))
    }

    /// Warm the cache under an already-held write lock and hand back the
    /// mutable post list.
    async fn ready_posts<'a>(
        state: &'a mut CacheState,
        store: &dyn PostStore,
    ) -> Result<&'a mut Vec<Post>, RepoError> {
        if !matches!(state, CacheState::Ready(_)) {
            *state = CacheState::Warming;
            match store.load_all().await {
                Ok(mut posts) => {
                    sort_by_recency(&mut posts);
                    info!(count = posts.len(), "post cache warmed from backing store");
                    *state = CacheState::Ready(posts);
                }
                Err(err) => {
                    *state = CacheState::Cold;
                    return Err(err);
                }
            }
        }

        match state {
            CacheState::Ready(posts) => Ok(posts),
            _ => Err(RepoError::Persistence("post cache unavailable".to_string())),
        }
    }

    /// Validate, normalise, externalize embedded images, and save an
    /// editor draft. New posts get a fresh timestamp-token id; existing
    /// posts keep their id, publication date, and comments.
    pub async fn submit_post(&self, draft: PostDraft) -> Result<Post, BlogError> {
        let now = OffsetDateTime::now_utc();

        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("title is required").into());
        }
        let body = draft.content.trim().to_string();
        if body.is_empty() {
            return Err(DomainError::validation("content is required").into());
        }
        let excerpt = draft.excerpt.trim().to_string();
        if excerpt.is_empty() {
            return Err(DomainError::validation("excerpt is required").into());
        }

        let mut post = match draft.id.as_deref() {
            Some(id) if !id.is_empty() => self.get_post_by_id(ListScope::Privileged, id).await?,
            _ => None,
        }
        .unwrap_or_else(|| Post::new(now));

        let requested = draft
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| create_slug_default(&title));

        post.slug = match self
            .get_post_by_slug(ListScope::Privileged, &requested)
            .await?
        {
            Some(owner) if !eq_ignore_case(&owner.id, &post.id) => {
                let resolved = create_slug_default(&format!("{title}{}", timestamp_suffix(now)));
                debug!(%requested, %resolved, "slug collision resolved with timestamp suffix");
                resolved
            }
            _ => requested,
        };

        post.title = title;
        post.is_published = draft.is_published;
        post.excerpt = excerpt;
        post.categories = normalize_labels(&draft.categories);
        post.tags = normalize_labels(&draft.tags);
        post.content =
            content::externalize_embedded_images(&body, self.files.as_ref()).await?;

        Ok(self.save_post(post).await?)
    }

    /// Append a reader comment. The post must exist within the caller's
    /// scope and still have its comment window open. Submissions carrying
    /// the honeypot field are dropped without error or persistence.
    pub async fn add_comment(
        &self,
        post_id: &str,
        submission: CommentSubmission,
        privileged: bool,
        config: &BlogConfig,
    ) -> Result<CommentOutcome, BlogError> {
        let now = OffsetDateTime::now_utc();
        let scope = ListScope::from_privileged(privileged);

        let mut post = self
            .get_post_by_id(scope, post_id)
            .await?
            .ok_or_else(|| BlogError::PostNotFound {
                id: post_id.to_string(),
            })?;

        if !post.are_comments_open(config.comments_close_after_days, now) {
            return Err(BlogError::CommentsClosed {
                id: post_id.to_string(),
            });
        }

        if submission.author.trim().is_empty() {
            return Err(DomainError::validation("comment author is required").into());
        }
        if submission.content.trim().is_empty() {
            return Err(DomainError::validation("comment content is required").into());
        }
        if submission.email.trim().is_empty() {
            return Err(DomainError::validation("comment email is required").into());
        }

        if submission.website.is_some() {
            debug!(post_id, "discarding comment that tripped the honeypot");
            return Ok(CommentOutcome::Discarded);
        }

        let comment = Comment::new(
            &submission.author,
            &submission.content,
            &submission.email,
            privileged,
            now,
        );
        post.comments.push(comment.clone());
        self.save_post(post).await?;

        Ok(CommentOutcome::Accepted(comment))
    }

    /// Remove one comment by id (case-insensitive). Returns whether a
    /// comment was actually removed.
    pub async fn delete_comment(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<bool, BlogError> {
        let mut post = self
            .get_post_by_id(ListScope::Privileged, post_id)
            .await?
            .ok_or_else(|| BlogError::PostNotFound {
                id: post_id.to_string(),
            })?;

        let before = post.comments.len();
        post.comments
            .retain(|comment| !eq_ignore_case(&comment.id, comment_id));
        if post.comments.len() == before {
            return Ok(false);
        }

        self.save_post(post).await?;
        Ok(true)
    }

    /// One page of the main listing, with counters and the display hint.
    pub async fn page_of_posts(
        &self,
        scope: ListScope,
        page: usize,
        config: &BlogConfig,
    ) -> Result<PostPage, RepoError> {
        let posts = self.get_posts(scope).await?;
        Ok(pagination::build_page(
            posts,
            config.posts_per_page,
            page,
            config.list_view,
        ))
    }

    /// One page of the posts carrying `category`.
    pub async fn page_by_category(
        &self,
        scope: ListScope,
        category: &str,
        page: usize,
        config: &BlogConfig,
    ) -> Result<PostPage, RepoError> {
        let posts = self.get_posts_by_category(scope, category).await?;
        Ok(pagination::build_page(
            posts,
            config.posts_per_page,
            page,
            config.list_view,
        ))
    }

    /// One page of the posts carrying `tag`.
    pub async fn page_by_tag(
        &self,
        scope: ListScope,
        tag: &str,
        page: usize,
        config: &BlogConfig,
    ) -> Result<PostPage, RepoError> {
        let posts = self.get_posts_by_tag(scope, tag).await?;
        Ok(pagination::build_page(
            posts,
            config.posts_per_page,
            page,
            config.list_view,
        ))
    }
}

#[async_trait]
impl PostRepository for CachedBlog {
    async fn get_posts(&self, scope: ListScope) -> Result<Vec<Post>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            posts
                .iter()
                .filter(|post| scope.allows(post, now))
                .cloned()
                .collect()
        })
        .await
    }

    async fn get_posts_window(
        &self,
        scope: ListScope,
        count: usize,
        skip: usize,
    ) -> Result<Vec<Post>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            posts
                .iter()
                .filter(|post| scope.allows(post, now))
                .skip(skip)
                .take(count)
                .cloned()
                .collect()
        })
        .await
    }

    async fn get_posts_by_category(
        &self,
        scope: ListScope,
        category: &str,
    ) -> Result<Vec<Post>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            posts
                .iter()
                .filter(|post| scope.allows(post, now) && post.has_category(category))
                .cloned()
                .collect()
        })
        .await
    }

    async fn get_posts_by_tag(&self, scope: ListScope, tag: &str) -> Result<Vec<Post>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            posts
                .iter()
                .filter(|post| scope.allows(post, now) && post.has_tag(tag))
                .cloned()
                .collect()
        })
        .await
    }

    async fn get_post_by_id(
        &self,
        scope: ListScope,
        id: &str,
    ) -> Result<Option<Post>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            posts
                .iter()
                .find(|post| eq_ignore_case(&post.id, id))
                .filter(|post| scope.allows(post, now))
                .cloned()
        })
        .await
    }

    async fn get_post_by_slug(
        &self,
        scope: ListScope,
        slug: &str,
    ) -> Result<Option<Post>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            posts
                .iter()
                .find(|post| eq_ignore_case(&post.slug, slug))
                .filter(|post| scope.allows(post, now))
                .cloned()
        })
        .await
    }

    async fn get_categories(&self, scope: ListScope) -> Result<Vec<String>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            distinct_labels(posts.iter().filter(|post| scope.allows(post, now)), |post| {
                &post.categories
            })
        })
        .await
    }

    async fn get_tags(&self, scope: ListScope) -> Result<Vec<String>, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.with_snapshot(|posts| {
            distinct_labels(posts.iter().filter(|post| scope.allows(post, now)), |post| {
                &post.tags
            })
        })
        .await
    }

    async fn save_post(&self, mut post: Post) -> Result<Post, RepoError> {
        let mut guard = self.cache.write().await;
        let posts = Self::ready_posts(&mut *guard, self.store.as_ref()).await?;

        post.last_modified = OffsetDateTime::now_utc();
        self.store.persist(&post).await?;

        match posts
            .iter_mut()
            .find(|existing| eq_ignore_case(&existing.id, &post.id))
        {
            Some(slot) => *slot = post.clone(),
            None => posts.push(post.clone()),
        }
        sort_by_recency(posts);
        debug!(id = %post.id, slug = %post.slug, "post saved");

        Ok(post)
    }

    async fn delete_post(&self, post: &Post) -> Result<(), RepoError> {
        let mut guard = self.cache.write().await;
        let posts = Self::ready_posts(&mut *guard, self.store.as_ref()).await?;

        self.store.remove(&post.id).await?;
        posts.retain(|existing| !eq_ignore_case(&existing.id, &post.id));
        info!(id = %post.id, "post deleted");

        Ok(())
    }

    async fn save_file(
        &self,
        bytes: Bytes,
        file_name: &str,
        suffix: Option<&str>,
    ) -> Result<String, RepoError> {
        self.files.save_file(bytes, file_name, suffix).await
    }
}

fn sort_by_recency(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
}

fn normalize_labels(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .map(|label| label.trim().to_lowercase())
        .filter(|label| !label.is_empty())
        .collect()
}

fn distinct_labels<'a>(
    posts: impl Iterator<Item = &'a Post>,
    pick: impl Fn(&Post) -> &Vec<String>,
) -> Vec<String> {
    let mut seen = Vec::new();
    for post in posts {
        for label in pick(post) {
            let normalized = label.to_lowercase();
            if !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
    }
    seen
}
