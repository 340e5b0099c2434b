//! Configuration layer: typed settings with layered precedence (file → env).

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::types::PostListView;

const DEFAULT_CONFIG_BASENAME: &str = "brezza";
const ENV_PREFIX: &str = "BREZZA";
const DEFAULT_COMMENTS_CLOSE_AFTER_DAYS: i64 = 10;
const DEFAULT_POSTS_PER_PAGE: i32 = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Engine settings consumed read-only by callers and handed into engine
/// calls as plain values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlogConfig {
    /// Days after publication during which a post accepts comments.
    pub comments_close_after_days: i64,
    /// Page size for every list endpoint; non-positive values fall back
    /// to the engine default at use sites.
    pub posts_per_page: i32,
    /// Display hint forwarded to list views untouched.
    pub list_view: PostListView,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            comments_close_after_days: DEFAULT_COMMENTS_CLOSE_AFTER_DAYS,
            posts_per_page: DEFAULT_POSTS_PER_PAGE,
            list_view: PostListView::default(),
        }
    }
}

impl BlogConfig {
    /// Load `brezza.*` from the working directory (optional) and apply
    /// `BREZZA_*` environment overrides on top.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_BASENAME)
    }

    /// Same as [`BlogConfig::load`] with an explicit file basename.
    pub fn load_from(basename: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(basename).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
