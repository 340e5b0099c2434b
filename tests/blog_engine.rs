//! End-to-end engine behaviour over the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use brezza::application::blog::{
    BlogError, CachedBlog, CommentOutcome, CommentSubmission, PostDraft,
};
use brezza::application::repos::{ListScope, PostRepository, PostStore, RepoError};
use brezza::config::BlogConfig;
use brezza::domain::posts::Post;
use brezza::infra::memory::{MemoryFileStore, MemoryPostStore};
use time::{Duration, OffsetDateTime};

fn post(title: &str, slug: &str, age_days: i64, now: OffsetDateTime) -> Post {
    let mut post = Post::new(now - Duration::days(age_days));
    post.title = title.to_string();
    post.slug = slug.to_string();
    post.content = format!("{title} body");
    post.excerpt = format!("{title} excerpt");
    post
}

async fn engine_with(posts: Vec<Post>) -> (CachedBlog, Arc<MemoryPostStore>, Arc<MemoryFileStore>) {
    let store = Arc::new(MemoryPostStore::new());
    store.seed(posts).await;
    let files = Arc::new(MemoryFileStore::new());
    let blog = CachedBlog::new(store.clone(), files.clone());
    (blog, store, files)
}

#[tokio::test]
async fn visibility_gates_readers_but_not_editors() {
    let now = OffsetDateTime::now_utc();
    let mut unpublished = post("Draft", "draft", 4, now);
    unpublished.is_published = false;
    let future = post("Scheduled", "scheduled", -2, now);

    let (blog, _, _) = engine_with(vec![
        post("Oldest", "oldest", 3, now),
        post("Middle", "middle", 2, now),
        post("Newest", "newest", 1, now),
        unpublished,
        future,
    ])
    .await;

    let public = blog.get_posts(ListScope::Public).await.expect("public");
    assert_eq!(
        public.iter().map(|p| p.slug.as_str()).collect::<Vec<_>>(),
        ["newest", "middle", "oldest"]
    );

    let privileged = blog.get_posts(ListScope::Privileged).await.expect("privileged");
    assert_eq!(privileged.len(), 5);
    assert!(
        privileged
            .windows(2)
            .all(|pair| pair[0].pub_date >= pair[1].pub_date)
    );
}

#[tokio::test]
async fn windows_skip_and_take_over_the_ordered_visible_set() {
    let now = OffsetDateTime::now_utc();
    let posts: Vec<Post> = (1..=5)
        .map(|age| post(&format!("Post {age}"), &format!("post-{age}"), age, now))
        .collect();
    let (blog, _, _) = engine_with(posts).await;

    let window = blog
        .get_posts_window(ListScope::Public, 2, 1)
        .await
        .expect("window");
    assert_eq!(
        window.iter().map(|p| p.slug.as_str()).collect::<Vec<_>>(),
        ["post-2", "post-3"]
    );
}

#[tokio::test]
async fn category_and_tag_filters_match_case_insensitively() {
    let now = OffsetDateTime::now_utc();
    let mut tagged = post("Tagged", "tagged", 1, now);
    tagged.categories = vec!["rust".to_string()];
    tagged.tags = vec!["engines".to_string()];
    let mut hidden = post("Hidden", "hidden", 2, now);
    hidden.categories = vec!["rust".to_string()];
    hidden.is_published = false;

    let (blog, _, _) = engine_with(vec![tagged, hidden, post("Plain", "plain", 3, now)]).await;

    let by_category = blog
        .get_posts_by_category(ListScope::Public, "RUST")
        .await
        .expect("category");
    assert_eq!(by_category.len(), 1);
    assert_eq!(by_category[0].slug, "tagged");

    let by_tag = blog
        .get_posts_by_tag(ListScope::Public, "Engines")
        .await
        .expect("tag");
    assert_eq!(by_tag.len(), 1);

    let privileged = blog
        .get_posts_by_category(ListScope::Privileged, "rust")
        .await
        .expect("privileged category");
    assert_eq!(privileged.len(), 2);
}

#[tokio::test]
async fn lookups_are_case_insensitive_and_respect_visibility() {
    let now = OffsetDateTime::now_utc();
    let mut secret = post("Secret", "secret", 1, now);
    secret.is_published = false;
    let visible = post("Visible", "Visible-Slug", 2, now);
    let visible_id = visible.id.clone();

    let (blog, _, _) = engine_with(vec![secret.clone(), visible]).await;

    let by_slug = blog
        .get_post_by_slug(ListScope::Public, "visible-slug")
        .await
        .expect("slug lookup");
    assert_eq!(by_slug.map(|p| p.id), Some(visible_id.clone()));

    let by_id = blog
        .get_post_by_id(ListScope::Public, &visible_id.to_uppercase())
        .await
        .expect("id lookup");
    assert!(by_id.is_some());

    assert!(
        blog.get_post_by_id(ListScope::Public, &secret.id)
            .await
            .expect("secret public")
            .is_none()
    );
    assert!(
        blog.get_post_by_id(ListScope::Privileged, &secret.id)
            .await
            .expect("secret privileged")
            .is_some()
    );
    assert!(
        blog.get_post_by_id(ListScope::Public, "no-such-id")
            .await
            .expect("missing")
            .is_none()
    );
}

#[tokio::test]
async fn label_enumerations_are_distinct_lowercase_and_scoped() {
    let now = OffsetDateTime::now_utc();
    let mut first = post("First", "first", 1, now);
    first.categories = vec!["Rust".to_string(), "tools".to_string()];
    first.tags = vec!["Cache".to_string()];
    let mut second = post("Second", "second", 2, now);
    second.categories = vec!["RUST".to_string()];
    second.tags = vec!["cache".to_string(), "io".to_string()];
    let mut draft = post("Draft", "draft", 3, now);
    draft.categories = vec!["secret-plans".to_string()];
    draft.is_published = false;

    let (blog, _, _) = engine_with(vec![first, second, draft]).await;

    let categories = blog.get_categories(ListScope::Public).await.expect("categories");
    assert_eq!(categories, ["rust", "tools"]);

    let tags = blog.get_tags(ListScope::Public).await.expect("tags");
    assert_eq!(tags, ["cache", "io"]);

    let all_categories = blog
        .get_categories(ListScope::Privileged)
        .await
        .expect("privileged categories");
    assert!(all_categories.contains(&"secret-plans".to_string()));
}

#[tokio::test]
async fn save_post_upserts_stamps_and_resorts() {
    let now = OffsetDateTime::now_utc();
    let original = post("Original", "original", 5, now);
    let id = original.id.clone();
    let stamp_before = original.last_modified;

    let (blog, store, _) = engine_with(vec![post("Other", "other", 2, now)]).await;

    let saved = blog.save_post(original).await.expect("insert");
    assert!(saved.last_modified >= stamp_before);
    assert_eq!(store.len().await, 2);

    // Move the post to the top of the feed and verify the snapshot resorts.
    let mut updated = saved.clone();
    updated.pub_date = now - Duration::hours(1);
    updated.title = "Updated".to_string();
    blog.save_post(updated).await.expect("update");

    let posts = blog.get_posts(ListScope::Privileged).await.expect("list");
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, id);
    assert_eq!(posts[0].title, "Updated");
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn delete_post_cascades_to_comments_and_cache() {
    let now = OffsetDateTime::now_utc();
    let mut target = post("Target", "target", 1, now);
    target.comments.push(brezza::domain::posts::Comment::new(
        "Ada",
        "first!",
        "ada@example.com",
        false,
        now,
    ));
    let id = target.id.clone();

    let (blog, store, _) = engine_with(vec![target.clone(), post("Keep", "keep", 2, now)]).await;

    blog.delete_post(&target).await.expect("delete");

    assert!(
        blog.get_post_by_id(ListScope::Privileged, &id)
            .await
            .expect("lookup")
            .is_none()
    );
    assert_eq!(store.len().await, 1);
}

/// Backing store that can be switched into a failing mode; reads go
/// through to an inner memory store.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryPostStore,
    fail_writes: AtomicBool,
    loads: AtomicUsize,
}

#[async_trait]
impl PostStore for FlakyStore {
    async fn load_all(&self) -> Result<Vec<Post>, RepoError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_all().await
    }

    async fn persist(&self, post: &Post) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("disk full".to_string()));
        }
        self.inner.persist(post).await
    }

    async fn remove(&self, id: &str) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("disk full".to_string()));
        }
        self.inner.remove(id).await
    }
}

#[tokio::test]
async fn failed_store_writes_leave_the_cache_untouched() {
    let now = OffsetDateTime::now_utc();
    let existing = post("Existing", "existing", 1, now);
    let store = Arc::new(FlakyStore::default());
    store.inner.seed(vec![existing.clone()]).await;
    let blog = CachedBlog::new(store.clone(), Arc::new(MemoryFileStore::new()));

    store.fail_writes.store(true, Ordering::SeqCst);

    let err = blog
        .save_post(post("New", "new", 2, now))
        .await
        .expect_err("write must fail");
    assert!(matches!(err, RepoError::Persistence(_)));

    let err = blog.delete_post(&existing).await.expect_err("delete must fail");
    assert!(matches!(err, RepoError::Persistence(_)));

    let posts = blog.get_posts(ListScope::Privileged).await.expect("list");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].slug, "existing");
}

#[tokio::test]
async fn reads_warm_the_cache_once_and_never_again() {
    let now = OffsetDateTime::now_utc();
    let store = Arc::new(FlakyStore::default());
    store.inner.seed(vec![post("Seeded", "seeded", 1, now)]).await;
    let blog = CachedBlog::new(store.clone(), Arc::new(MemoryFileStore::new()));

    blog.get_posts(ListScope::Public).await.expect("first read");
    blog.get_posts(ListScope::Public).await.expect("second read");
    blog.save_post(post("Later", "later", 2, now))
        .await
        .expect("write");
    blog.get_posts(ListScope::Public).await.expect("third read");

    assert_eq!(store.loads.load(Ordering::SeqCst), 1);
}

fn submission(author: &str) -> CommentSubmission {
    CommentSubmission {
        author: author.to_string(),
        content: "  nice post  ".to_string(),
        email: " reader@example.com ".to_string(),
        website: None,
    }
}

#[tokio::test]
async fn comments_are_trimmed_accepted_and_persisted() {
    let now = OffsetDateTime::now_utc();
    let target = post("Target", "target", 1, now);
    let id = target.id.clone();
    let (blog, store, _) = engine_with(vec![target]).await;
    let config = BlogConfig::default();

    let outcome = blog
        .add_comment(&id, submission("  Ada "), true, &config)
        .await
        .expect("comment");

    let CommentOutcome::Accepted(comment) = outcome else {
        panic!("expected acceptance");
    };
    assert_eq!(comment.author, "Ada");
    assert_eq!(comment.content, "nice post");
    assert!(comment.is_admin);

    let stored = store.load_all().await.expect("load");
    assert_eq!(stored[0].comments.len(), 1);
    assert_eq!(stored[0].comments[0].id, comment.id);
}

#[tokio::test]
async fn honeypot_submissions_are_discarded_without_error() {
    let now = OffsetDateTime::now_utc();
    let target = post("Target", "target", 1, now);
    let id = target.id.clone();
    let (blog, store, _) = engine_with(vec![target]).await;

    let mut tripped = submission("Bot");
    tripped.website = Some(String::new());

    let outcome = blog
        .add_comment(&id, tripped, false, &BlogConfig::default())
        .await
        .expect("comment");
    assert_eq!(outcome, CommentOutcome::Discarded);

    let stored = store.load_all().await.expect("load");
    assert!(stored[0].comments.is_empty());
}

#[tokio::test]
async fn comment_window_and_missing_posts_surface_as_errors() {
    let now = OffsetDateTime::now_utc();
    let stale = post("Stale", "stale", 30, now);
    let stale_id = stale.id.clone();
    let mut secret = post("Secret", "secret", 1, now);
    secret.is_published = false;
    let secret_id = secret.id.clone();
    let (blog, _, _) = engine_with(vec![stale, secret]).await;
    let config = BlogConfig::default();

    let err = blog
        .add_comment(&stale_id, submission("Ada"), false, &config)
        .await
        .expect_err("window closed");
    assert!(matches!(err, BlogError::CommentsClosed { .. }));

    let err = blog
        .add_comment("missing", submission("Ada"), false, &config)
        .await
        .expect_err("missing post");
    assert!(matches!(err, BlogError::PostNotFound { .. }));

    // An invisible post is indistinguishable from a missing one for
    // non-privileged callers.
    let err = blog
        .add_comment(&secret_id, submission("Ada"), false, &config)
        .await
        .expect_err("invisible post");
    assert!(matches!(err, BlogError::PostNotFound { .. }));
}

#[tokio::test]
async fn delete_comment_removes_exactly_the_matched_one() {
    let now = OffsetDateTime::now_utc();
    let mut target = post("Target", "target", 1, now);
    let keep = brezza::domain::posts::Comment::new("Keep", "stays", "k@example.com", false, now);
    let spam = brezza::domain::posts::Comment::new("Drop", "goes", "d@example.com", false, now);
    let drop_id = spam.id.clone();
    target.comments = vec![keep.clone(), spam];
    let id = target.id.clone();

    let (blog, _, _) = engine_with(vec![target]).await;

    let removed = blog
        .delete_comment(&id, &drop_id.to_uppercase())
        .await
        .expect("delete");
    assert!(removed);

    let post = blog
        .get_post_by_id(ListScope::Privileged, &id)
        .await
        .expect("lookup")
        .expect("post");
    assert_eq!(post.comments.len(), 1);
    assert_eq!(post.comments[0].id, keep.id);

    let removed_again = blog.delete_comment(&id, &drop_id).await.expect("idempotent");
    assert!(!removed_again);
}

#[tokio::test]
async fn submit_post_creates_normalises_and_externalizes() {
    let (blog, _, files) = engine_with(Vec::new()).await;

    let draft = PostDraft {
        id: None,
        title: "  Engine Notes  ".to_string(),
        slug: None,
        content: "<img src=\"data:image/png;base64,AAAA\" data-filename=\"shot.png\"> body"
            .to_string(),
        excerpt: "notes".to_string(),
        is_published: true,
        categories: vec![" Rust ".to_string(), String::new()],
        tags: vec!["Caching".to_string()],
    };

    let saved = blog.submit_post(draft).await.expect("submit");

    assert_eq!(saved.title, "Engine Notes");
    assert_eq!(saved.slug, "engine-notes");
    assert_eq!(saved.categories, ["rust"]);
    assert_eq!(saved.tags, ["caching"]);
    assert!(!saved.id.is_empty());
    assert!(saved.content.starts_with("<img src=\"/media/1-shot.png\">"));

    let uploads = files.saved().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].file_name, "shot.png");
}

#[tokio::test]
async fn submit_post_resolves_slug_collisions_with_a_timestamp_suffix() {
    let now = OffsetDateTime::now_utc();
    let owner = post("Engine Notes", "engine-notes", 1, now);
    let (blog, _, _) = engine_with(vec![owner]).await;

    let draft = PostDraft {
        id: None,
        title: "Engine Notes".to_string(),
        slug: None,
        content: "body".to_string(),
        excerpt: "e".to_string(),
        is_published: true,
        categories: Vec::new(),
        tags: Vec::new(),
    };

    let saved = blog.submit_post(draft).await.expect("submit");
    assert_ne!(saved.slug, "engine-notes");
    assert!(saved.slug.starts_with("engine-notes"));
    // Twelve extra digits from the YYYYMMDDHHMM suffix.
    assert_eq!(saved.slug.len(), "engine-notes".len() + 12);
}

#[tokio::test]
async fn submit_post_keeps_identity_when_updating() {
    let now = OffsetDateTime::now_utc();
    let mut existing = post("Engine Notes", "engine-notes", 1, now);
    existing.comments.push(brezza::domain::posts::Comment::new(
        "Ada",
        "hello",
        "a@example.com",
        false,
        now,
    ));
    let id = existing.id.clone();
    let pub_date = existing.pub_date;
    let (blog, _, _) = engine_with(vec![existing]).await;

    let draft = PostDraft {
        id: Some(id.clone()),
        title: "Engine Notes".to_string(),
        slug: Some("engine-notes".to_string()),
        content: "new body".to_string(),
        excerpt: "new excerpt".to_string(),
        is_published: true,
        categories: Vec::new(),
        tags: Vec::new(),
    };

    let saved = blog.submit_post(draft).await.expect("submit");
    assert_eq!(saved.id, id);
    assert_eq!(saved.slug, "engine-notes");
    assert_eq!(saved.pub_date, pub_date);
    assert_eq!(saved.comments.len(), 1);
    assert_eq!(saved.content, "new body");
}

#[tokio::test]
async fn submit_post_rejects_empty_required_fields() {
    let (blog, _, _) = engine_with(Vec::new()).await;

    let draft = PostDraft {
        title: "   ".to_string(),
        content: "body".to_string(),
        excerpt: "e".to_string(),
        is_published: true,
        ..PostDraft::default()
    };
    let err = blog.submit_post(draft).await.expect_err("empty title");
    assert!(matches!(err, BlogError::Validation(_)));

    let posts = blog.get_posts(ListScope::Privileged).await.expect("list");
    assert!(posts.is_empty());
}

#[tokio::test]
async fn page_helpers_apply_the_legacy_pagination() {
    let now = OffsetDateTime::now_utc();
    let posts: Vec<Post> = (1..=9)
        .map(|age| post(&format!("Post {age}"), &format!("post-{age}"), age, now))
        .collect();
    let (blog, _, _) = engine_with(posts).await;
    let config = BlogConfig::default();

    let first = blog
        .page_of_posts(ListScope::Public, 0, &config)
        .await
        .expect("page 0");
    assert_eq!(first.total_posts, 9);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.posts_per_page, 4);
    assert_eq!(first.posts.len(), 4);
    assert_eq!(first.posts[0].slug, "post-1");

    let last = blog
        .page_of_posts(ListScope::Public, 2, &config)
        .await
        .expect("page 2");
    assert_eq!(last.posts.len(), 1);
    assert_eq!(last.posts[0].slug, "post-9");
}
