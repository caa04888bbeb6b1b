//! Replica configuration.
//!
//! Values come from the environment (or any key lookup, for tests):
//!
//! | Variable                  | Meaning                          | Default                 |
//! |---------------------------|----------------------------------|-------------------------|
//! | `GITLAB_TOKEN`            | personal access token (required) |                         |
//! | `GITLAB_URL`              | instance base URL                | `https://gitlab.com`    |
//! | `GITLAB_REPLICA_DB`       | SQLite file                      | `<data dir>/gitlab-replica/replica.db` |
//! | `GITLAB_REPLICA_PER_PAGE` | page size for sync fetches       | `100`                   |

use crate::db;
use crate::error::ReplicaError;
use crate::services::gitlab_client::{GitLabClientConfig, DEFAULT_BASE_URL};
use crate::services::remote::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_TOKEN: &str = "GITLAB_TOKEN";
pub const ENV_BASE_URL: &str = "GITLAB_URL";
pub const ENV_DB_PATH: &str = "GITLAB_REPLICA_DB";
pub const ENV_PER_PAGE: &str = "GITLAB_REPLICA_PER_PAGE";

/// Groups whose last full sync is older than this trigger a staleness hint.
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 7;

/// Sync tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Page size for every paginated fetch.
    pub per_page: u32,

    /// Age in days after which the status report suggests a full sync.
    pub stale_after_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
        }
    }
}

/// Everything needed to open a replica and sync it.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub gitlab: GitLabClientConfig,
    pub db_path: PathBuf,
    pub sync: SyncConfig,
}

impl ReplicaConfig {
    /// Build a configuration from process environment variables.
    pub fn from_env() -> Result<Self, ReplicaError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReplicaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get(ENV_TOKEN)
            .ok_or_else(|| ReplicaError::config_field("GitLab token is not set", ENV_TOKEN))?;

        let base_url = get(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ReplicaError::config_field(
                format!("GitLab URL must start with http:// or https://, got '{}'", base_url),
                ENV_BASE_URL,
            ));
        }

        let db_path = match get(ENV_DB_PATH) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let mut sync = SyncConfig::default();
        if let Some(raw) = get(ENV_PER_PAGE) {
            sync.per_page = raw
                .parse::<u32>()
                .ok()
                .filter(|n| (1..=MAX_PER_PAGE).contains(n))
                .ok_or_else(|| {
                    ReplicaError::config_field(
                        format!("Page size must be between 1 and {}, got '{}'", MAX_PER_PAGE, raw),
                        ENV_PER_PAGE,
                    )
                })?;
        }

        Ok(Self {
            gitlab: GitLabClientConfig {
                base_url,
                token,
                ..Default::default()
            },
            db_path,
            sync,
        })
    }
}

/// Default replica location under the user's data directory.
pub fn default_db_path() -> Result<PathBuf, ReplicaError> {
    let data_dir = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| ReplicaError::config_field("Cannot determine a data directory", ENV_DB_PATH))?;
    Ok(db::get_db_path(&data_dir.join("gitlab-replica")))
}
