//! PostgreSQL persistence adapter.

mod posts;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::application::repos::RepoError;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Relational [`crate::application::repos::PostStore`] backend. Posts and
/// comments live in two tables; comment deletion cascades through a
/// foreign key.
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small dedicated pool.
    pub async fn connect(database_url: &str) -> Result<Self, RepoError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(RepoError::from_persistence)?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), RepoError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(RepoError::from_persistence)
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
