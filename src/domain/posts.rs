//! Post and comment entities with their visibility invariants.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use url::form_urlencoded;
use uuid::Uuid;

/// A blog post together with its owned comments.
///
/// Categories and tags are stored lower-cased; duplicates are tolerated by
/// the type but carry no meaning. Comment order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub is_published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub pub_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    /// Create an empty draft stamped at `now`, published by default.
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            id: Self::generate_id(now),
            slug: String::new(),
            title: String::new(),
            content: String::new(),
            excerpt: String::new(),
            is_published: true,
            pub_date: now,
            last_modified: now,
            categories: Vec::new(),
            tags: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Timestamp-derived identity token: UTC nanoseconds since the epoch,
    /// rendered in decimal. Fixed digit width until 2262, so lexical order
    /// matches creation order.
    pub fn generate_id(now: OffsetDateTime) -> String {
        now.unix_timestamp_nanos().to_string()
    }

    /// A post is visible once published and past its publication instant.
    pub fn is_visible(&self, now: OffsetDateTime) -> bool {
        self.is_published && self.pub_date <= now
    }

    /// Comments stay open for `close_after_days` days after publication.
    pub fn are_comments_open(&self, close_after_days: i64, now: OffsetDateTime) -> bool {
        self.pub_date + Duration::days(close_after_days) >= now
    }

    /// Permalink path for this post.
    pub fn link(&self) -> String {
        format!("/blog/{}/", self.slug)
    }

    /// Permalink path with the slug segment form-encoded.
    pub fn encoded_link(&self) -> String {
        let encoded: String = form_urlencoded::byte_serialize(self.slug.as_bytes()).collect();
        format!("/blog/{encoded}/")
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| eq_ignore_case(c, category))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| eq_ignore_case(t, tag))
    }
}

/// A reader comment owned by exactly one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub email: String,
    pub content: String,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub pub_date: OffsetDateTime,
}

impl Comment {
    /// Build a comment from trimmed submission fields. `is_admin` is the
    /// caller-privilege capture at submission time and never changes.
    pub fn new(
        author: &str,
        content: &str,
        email: &str,
        is_admin: bool,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            author: author.trim().to_string(),
            email: email.trim().to_string(),
            content: content.trim().to_string(),
            is_admin,
            pub_date: now,
        }
    }

    /// Gravatar URL derived from the SHA-256 digest of the normalised
    /// e-mail address.
    pub fn avatar_url(&self) -> String {
        let digest = Sha256::digest(self.email.trim().to_lowercase().as_bytes());
        format!(
            "https://www.gravatar.com/avatar/{}?s=60&d=blank",
            hex::encode(digest)
        )
    }
}

/// Case-folded equality used for ids, slugs, categories, and tags.
pub(crate) fn eq_ignore_case(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}
