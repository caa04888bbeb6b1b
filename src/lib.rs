//! GitLab Replica - local SQLite replica of GitLab groups, projects and issues.
//!
//! The replica is kept consistent with GitLab through full syncs (fetch
//! everything, prune what disappeared) and incremental syncs (fetch what
//! changed since the per-resource watermark). The library installs no logger;
//! it reports through the `log` facade.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use config::ReplicaConfig;
use db::replica_store::ReplicaStore;
use error::ReplicaError;
use services::{GitLabClient, ReplicaReader, SyncOrchestrator};
use std::sync::Arc;

/// A replica wired to a GitLab instance.
pub struct Replica {
    pub orchestrator: SyncOrchestrator<GitLabClient>,
    pub reader: ReplicaReader<GitLabClient>,
}

/// Open (creating and migrating if needed) the replica described by `config`.
///
/// Nothing is synced; call [`SyncOrchestrator::bootstrap`] to fill an empty
/// replica.
pub async fn open(config: &ReplicaConfig) -> Result<Replica, ReplicaError> {
    let store = ReplicaStore::open(&config.db_path).await?;
    let client = Arc::new(GitLabClient::new(config.gitlab.clone())?);

    log::info!(
        "[store] Replica at {} for {}",
        config.db_path.display(),
        client.base_url()
    );

    Ok(Replica {
        orchestrator: SyncOrchestrator::new(Arc::clone(&client), store.clone(), config.sync.clone()),
        reader: ReplicaReader::new(client, store, config.sync.per_page),
    })
}
