//! One fetch + reconcile cycle per resource kind.
//!
//! Full mode fetches the complete remote listing, upserts it and prunes every
//! local row that was not fetched. Incremental mode fetches only what changed
//! since the resource's watermark and never prunes. A watermark is written only
//! after the step's writes committed.

use crate::db::replica_store::ReplicaStore;
use crate::error::ReplicaError;
use crate::models::{Group, Issue, ReplicaRecord, ResourceType};
use crate::services::convert;
use crate::services::remote::{
    self, bounded_page_size, IssuesQuery, ProjectsQuery, RemoteSource, DEFAULT_PER_PAGE,
};
use crate::services::sync_events::{StepOutcome, SyncMode, SyncStep};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs single-resource sync steps against one remote and one store.
pub struct ResourceSyncer<R: RemoteSource> {
    remote: Arc<R>,
    store: ReplicaStore,
    per_page: u32,
}

impl<R: RemoteSource> ResourceSyncer<R> {
    pub fn new(remote: Arc<R>, store: ReplicaStore) -> Self {
        Self::with_page_size(remote, store, DEFAULT_PER_PAGE)
    }

    /// `per_page` is clamped into GitLab's accepted range.
    pub fn with_page_size(remote: Arc<R>, store: ReplicaStore, per_page: u32) -> Self {
        Self {
            remote,
            store,
            per_page: bounded_page_size(per_page),
        }
    }

    /// Replace the stored current user. The user is a singleton, so this is
    /// always a full sync.
    pub async fn sync_user(&self, started_at: DateTime<Utc>) -> Result<StepOutcome, ReplicaError> {
        let user = convert::current_user(self.remote.current_user().await?);
        self.store.upsert_current_user(&user).await?;
        self.store
            .set_watermark(ResourceType::User, started_at, true)
            .await?;

        log::info!("[sync] Synced current user {}", user.username);
        Ok(StepOutcome::new(SyncStep::User, SyncMode::Full, 1, 0))
    }

    /// Groups have no time filter on the remote, so they always sync in full.
    pub async fn sync_groups(&self, started_at: DateTime<Utc>) -> Result<StepOutcome, ReplicaError> {
        let groups: Vec<Group> = remote::all_groups(self.remote.as_ref(), self.per_page)
            .await?
            .into_iter()
            .map(convert::group)
            .collect();

        self.reconcile_full(SyncStep::Groups, &groups, started_at).await
    }

    /// Projects the caller is a member of, filtered by last activity when
    /// incremental.
    pub async fn sync_projects(
        &self,
        mode: SyncMode,
        started_at: DateTime<Utc>,
    ) -> Result<StepOutcome, ReplicaError> {
        let since = self.window(ResourceType::Projects, mode).await?;
        let fetched = remote::all_projects(
            self.remote.as_ref(),
            &ProjectsQuery::membership(since.clone()),
            self.per_page,
        )
        .await?;
        let projects = convert::active_projects(fetched);

        match since {
            None => self.reconcile_full(SyncStep::Projects, &projects, started_at).await,
            Some(_) => {
                self.apply_incremental(SyncStep::Projects, &projects, started_at)
                    .await
            }
        }
    }

    /// Issues assigned to the caller, filtered by update time when incremental.
    pub async fn sync_issues(
        &self,
        mode: SyncMode,
        started_at: DateTime<Utc>,
    ) -> Result<StepOutcome, ReplicaError> {
        let since = self.window(ResourceType::Issues, mode).await?;
        let issues: Vec<Issue> = remote::all_issues(
            self.remote.as_ref(),
            &IssuesQuery::assigned_to_me(since.clone()),
            self.per_page,
        )
        .await?
        .into_iter()
        .map(convert::issue)
        .collect();

        match since {
            None => self.reconcile_full(SyncStep::Issues, &issues, started_at).await,
            Some(_) => self.apply_incremental(SyncStep::Issues, &issues, started_at).await,
        }
    }

    /// Fetch every stored group's issues and replace that group's links.
    ///
    /// Stops at the first group that fails; groups processed before it keep
    /// their committed links and the `group_issues` watermark stays put.
    pub async fn sync_group_issue_links(
        &self,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, ReplicaError> {
        let groups = self.store.list_groups().await?;
        if groups.is_empty() {
            log::info!("[sync] No groups stored; sync groups before linking issues");
            return Ok(StepOutcome::new(
                SyncStep::GroupIssueLinks,
                SyncMode::Incremental,
                0,
                0,
            ));
        }

        let since = self
            .window(ResourceType::GroupIssues, SyncMode::Incremental)
            .await?;
        let mode = if since.is_some() {
            SyncMode::Incremental
        } else {
            SyncMode::Full
        };

        let mut total = 0;
        for group in &groups {
            let issues = self
                .fetch_group_issues(group.id, since.clone(), cancel)
                .await
                .map_err(|e| {
                    log::warn!("[sync] Issues of group {} ({}) failed: {}", group.full_path, group.id, e);
                    e
                })?;

            // An empty incremental window says nothing about current membership.
            if issues.is_empty() && since.is_some() {
                continue;
            }

            self.store.upsert_many(&issues).await?;
            let ids: Vec<i64> = issues.iter().map(|i| i.id).collect();
            self.store.replace_group_issue_links(group.id, &ids).await?;

            log::debug!("[sync] Linked {} issues to group {}", ids.len(), group.full_path);
            total += issues.len();
        }

        self.store
            .set_watermark(ResourceType::GroupIssues, started_at, mode == SyncMode::Full)
            .await?;

        log::info!(
            "[sync] Synced {} group issues across {} groups ({})",
            total,
            groups.len(),
            mode
        );
        Ok(StepOutcome::new(SyncStep::GroupIssueLinks, mode, total, 0))
    }

    async fn fetch_group_issues(
        &self,
        group_id: i64,
        since: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Issue>, ReplicaError> {
        let mut stream = remote::stream_group_issues(
            Arc::clone(&self.remote),
            group_id,
            IssuesQuery::all_states(since),
            self.per_page,
            cancel.child_token(),
        );

        let mut issues = Vec::new();
        while let Some(raw) = stream.next_item().await {
            issues.push(convert::issue(raw));
        }
        stream.finish().await?;

        Ok(issues)
    }

    /// Lower bound for an incremental fetch, or `None` for a full fetch.
    ///
    /// A resource that was never synced falls back to a full fetch.
    async fn window(
        &self,
        resource: ResourceType,
        mode: SyncMode,
    ) -> Result<Option<String>, ReplicaError> {
        if mode == SyncMode::Full {
            return Ok(None);
        }
        match self.store.get_watermark(resource).await? {
            Some(watermark) => Ok(Some(convert::to_api_timestamp(watermark.last_synced_at))),
            None => {
                log::info!("[sync] No watermark for {}; running full sync", resource);
                Ok(None)
            }
        }
    }

    async fn reconcile_full<E: ReplicaRecord>(
        &self,
        step: SyncStep,
        records: &[E],
        started_at: DateTime<Utc>,
    ) -> Result<StepOutcome, ReplicaError> {
        self.store.upsert_many(records).await?;
        let ids: Vec<i64> = records.iter().map(|r| r.id()).collect();
        let pruned = self.store.prune(E::KIND, &ids).await?;

        if let Some(resource) = step.resource() {
            self.store.set_watermark(resource, started_at, true).await?;
        }

        log::info!(
            "[sync] Synced {} {} (full, {} pruned)",
            records.len(),
            E::KIND,
            pruned
        );
        Ok(StepOutcome::new(step, SyncMode::Full, records.len(), pruned))
    }

    async fn apply_incremental<E: ReplicaRecord>(
        &self,
        step: SyncStep,
        records: &[E],
        started_at: DateTime<Utc>,
    ) -> Result<StepOutcome, ReplicaError> {
        if !records.is_empty() {
            self.store.upsert_many(records).await?;
        }

        // An empty delta still moves the scan point forward.
        if let Some(resource) = step.resource() {
            self.store.set_watermark(resource, started_at, false).await?;
        }

        log::info!("[sync] Synced {} {} (incremental)", records.len(), E::KIND);
        Ok(StepOutcome::new(step, SyncMode::Incremental, records.len(), 0))
    }
}
