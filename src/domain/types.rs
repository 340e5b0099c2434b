//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

/// How list endpoints should present each post. A display hint passed
/// through to callers untouched; the engine never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostListView {
    TitlesOnly,
    #[default]
    TitlesAndExcerpts,
    FullPosts,
}
