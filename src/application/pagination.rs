//! Offset pagination over the ordered post snapshot.

use crate::domain::{posts::Post, types::PostListView};

/// Fallback page size when the configured value is zero or negative.
pub const DEFAULT_POSTS_PER_PAGE: i32 = 4;

/// One page of posts plus the counters list views render from.
#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total_posts: usize,
    /// Signed on purpose; see [`total_pages`].
    pub total_pages: i64,
    pub posts_per_page: usize,
    /// Display hint passed through from configuration, never interpreted.
    pub view: PostListView,
}

/// Resolve the effective page size, falling back to
/// [`DEFAULT_POSTS_PER_PAGE`] when configured non-positive.
pub fn effective_posts_per_page(configured: i32) -> usize {
    if configured <= 0 {
        DEFAULT_POSTS_PER_PAGE as usize
    } else {
        configured as usize
    }
}

/// Total page count as the legacy integer arithmetic computes it:
/// `n / per_page - (1 if n divides evenly else 0)`.
///
/// This undercounts by one whenever the post count divides evenly by the
/// page size, and yields `-1` for an empty set. Downstream pager markup
/// was built against exactly these numbers, so the arithmetic is kept
/// verbatim; see DESIGN.md before changing it.
pub fn total_pages(total_posts: usize, posts_per_page: usize) -> i64 {
    let n = total_posts as i64;
    let per_page = posts_per_page as i64;
    n / per_page - if n % per_page == 0 { 1 } else { 0 }
}

/// The window for a 0-based `page`: skip `posts_per_page * page`, take
/// `posts_per_page`.
pub fn page_window(posts: &[Post], posts_per_page: usize, page: usize) -> Vec<Post> {
    posts
        .iter()
        .skip(posts_per_page.saturating_mul(page))
        .take(posts_per_page)
        .cloned()
        .collect()
}

/// Assemble a [`PostPage`] from an already-filtered, already-ordered post
/// list.
pub fn build_page(
    posts: Vec<Post>,
    configured_posts_per_page: i32,
    page: usize,
    view: PostListView,
) -> PostPage {
    let posts_per_page = effective_posts_per_page(configured_posts_per_page);
    let total_posts = posts.len();
    PostPage {
        total_pages: total_pages(total_posts, posts_per_page),
        posts: page_window(&posts, posts_per_page, page),
        total_posts,
        posts_per_page,
        view,
    }
}
