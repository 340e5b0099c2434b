use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{PostStore, RepoError};
use crate::domain::posts::{Comment, Post};

use super::PgPostStore;

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    slug: String,
    title: String,
    excerpt: String,
    content: String,
    is_published: bool,
    pub_date: OffsetDateTime,
    last_modified: OffsetDateTime,
    categories: Vec<String>,
    tags: Vec<String>,
}

impl PostRow {
    fn into_post(self, comments: Vec<Comment>) -> Post {
        Post {
            id: self.id,
            slug: self.slug,
            title: self.title,
            excerpt: self.excerpt,
            content: self.content,
            is_published: self.is_published,
            pub_date: self.pub_date,
            last_modified: self.last_modified,
            categories: self.categories,
            tags: self.tags,
            comments,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    post_id: String,
    author: String,
    email: String,
    content: String,
    is_admin: bool,
    pub_date: OffsetDateTime,
}

impl CommentRow {
    fn into_comment(self) -> Comment {
        Comment {
            id: self.id,
            author: self.author,
            email: self.email,
            content: self.content,
            is_admin: self.is_admin,
            pub_date: self.pub_date,
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    RepoError::from_persistence(err)
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn load_all(&self) -> Result<Vec<Post>, RepoError> {
        let post_rows: Vec<PostRow> = sqlx::query_as(
            "SELECT id, slug, title, excerpt, content, is_published, pub_date, last_modified, \
             categories, tags FROM posts",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let comment_rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT id, post_id, author, email, content, is_admin, pub_date FROM comments \
             ORDER BY post_id, position",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut comments_by_post: HashMap<String, Vec<Comment>> = HashMap::new();
        for row in comment_rows {
            comments_by_post
                .entry(row.post_id.clone())
                .or_default()
                .push(row.into_comment());
        }

        Ok(post_rows
            .into_iter()
            .map(|row| {
                let comments = comments_by_post.remove(&row.id).unwrap_or_default();
                row.into_post(comments)
            })
            .collect())
    }

    async fn persist(&self, post: &Post) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO posts (id, slug, title, excerpt, content, is_published, pub_date, \
             last_modified, categories, tags) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
             slug = EXCLUDED.slug, title = EXCLUDED.title, excerpt = EXCLUDED.excerpt, \
             content = EXCLUDED.content, is_published = EXCLUDED.is_published, \
             pub_date = EXCLUDED.pub_date, last_modified = EXCLUDED.last_modified, \
             categories = EXCLUDED.categories, tags = EXCLUDED.tags",
        )
        .bind(&post.id)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(post.is_published)
        .bind(post.pub_date)
        .bind(post.last_modified)
        .bind(&post.categories)
        .bind(&post.tags)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        // Comments are replaced wholesale; the post owns them and their
        // count per post stays small.
        sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(&post.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for (position, comment) in post.comments.iter().enumerate() {
            sqlx::query(
                "INSERT INTO comments (id, post_id, position, author, email, content, \
                 is_admin, pub_date) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(&comment.id)
            .bind(&post.id)
            .bind(position as i32)
            .bind(&comment.author)
            .bind(&comment.email)
            .bind(&comment.content)
            .bind(comment.is_admin)
            .bind(comment.pub_date)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn remove(&self, id: &str) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM posts WHERE lower(id) = lower($1)")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
