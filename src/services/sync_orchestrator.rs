//! Sequencing of sync runs.
//!
//! A run executes its steps strictly one after another in the caller's task.
//! The first failing step aborts the run; steps that already finished stay
//! committed. Every watermark written during a run carries the run's start
//! time, so records changed while the run was in flight are picked up again
//! by the next incremental sync.

use crate::config::SyncConfig;
use crate::db::replica_store::ReplicaStore;
use crate::error::ReplicaError;
use crate::models::{ResourceType, SyncWatermark};
use crate::services::remote::RemoteSource;
use crate::services::resource_syncer::ResourceSyncer;
use crate::services::sync_events::{StepOutcome, SyncMode, SyncState, SyncStep};
use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
}

/// What [`SyncOrchestrator::bootstrap`] did.
#[derive(Debug)]
pub enum Bootstrap {
    /// The replica already had data; nothing ran.
    Ready,

    /// The replica was empty and a full sync filled it.
    Synced(SyncReport),

    /// The replica was empty and the full sync failed. Reads should go to the
    /// remote directly.
    Degraded(ReplicaError),
}

impl Bootstrap {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Sync state of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub resource: ResourceType,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_full_sync: bool,
}

/// Per-resource watermarks plus an optional staleness hint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub resources: Vec<ResourceStatus>,
    pub stale_hint: Option<String>,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sync Status")?;
        for status in &self.resources {
            match status.last_synced_at {
                Some(at) => writeln!(
                    f,
                    "  {:<13}{}{}",
                    status.resource,
                    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    if status.is_full_sync { " (full)" } else { "" }
                )?,
                None => writeln!(f, "  {:<13}never", status.resource)?,
            }
        }
        if let Some(hint) = &self.stale_hint {
            writeln!(f, "  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Runs full, incremental and link syncs against one replica.
pub struct SyncOrchestrator<R: RemoteSource> {
    syncer: ResourceSyncer<R>,
    store: ReplicaStore,
    config: SyncConfig,
    state: Arc<RwLock<SyncState>>,
    cancel: RwLock<CancellationToken>,
}

impl<R: RemoteSource> SyncOrchestrator<R> {
    pub fn new(remote: Arc<R>, store: ReplicaStore, config: SyncConfig) -> Self {
        Self {
            syncer: ResourceSyncer::with_page_size(remote, store.clone(), config.per_page),
            store,
            config,
            state: Arc::new(RwLock::new(SyncState::Idle)),
            cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// The store this orchestrator writes to.
    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    /// Current run state.
    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    /// Shared handle to the run state, for observers on other tasks.
    pub fn state_handle(&self) -> Arc<RwLock<SyncState>> {
        Arc::clone(&self.state)
    }

    /// Cancel the run in progress. Streaming fetches stop at their next page
    /// request or handoff; the run fails with a cancellation.
    pub async fn cancel(&self) {
        self.cancel.read().await.cancel();
    }

    /// Full reconciliation of user, groups, projects and issues, then stamp
    /// all four watermarks as full.
    pub async fn sync_all(&self) -> Result<SyncReport, ReplicaError> {
        let (started_at, cancel) = self.begin_run("full").await;
        let mut steps = Vec::with_capacity(5);

        steps.push(self.run_step(SyncStep::User, &cancel, self.syncer.sync_user(started_at)).await?);
        steps.push(self.run_step(SyncStep::Groups, &cancel, self.syncer.sync_groups(started_at)).await?);
        steps.push(
            self.run_step(
                SyncStep::Projects,
                &cancel,
                self.syncer.sync_projects(SyncMode::Full, started_at),
            )
            .await?,
        );
        steps.push(
            self.run_step(
                SyncStep::Issues,
                &cancel,
                self.syncer.sync_issues(SyncMode::Full, started_at),
            )
            .await?,
        );
        steps.push(
            self.run_step(SyncStep::StampWatermarks, &cancel, async {
                self.store
                    .stamp_full_sync(&ResourceType::FULL_SYNC, started_at)
                    .await?;
                Ok(StepOutcome::new(SyncStep::StampWatermarks, SyncMode::Full, 0, 0))
            })
            .await?,
        );

        Ok(self.finish_run(SyncMode::Full, started_at, steps).await)
    }

    /// User and groups in full, projects and issues changed since their
    /// watermarks. Group issue links are not part of this run.
    pub async fn sync_incremental(&self) -> Result<SyncReport, ReplicaError> {
        let (started_at, cancel) = self.begin_run("incremental").await;
        let mut steps = Vec::with_capacity(4);

        steps.push(self.run_step(SyncStep::User, &cancel, self.syncer.sync_user(started_at)).await?);
        steps.push(self.run_step(SyncStep::Groups, &cancel, self.syncer.sync_groups(started_at)).await?);
        steps.push(
            self.run_step(
                SyncStep::Projects,
                &cancel,
                self.syncer.sync_projects(SyncMode::Incremental, started_at),
            )
            .await?,
        );
        steps.push(
            self.run_step(
                SyncStep::Issues,
                &cancel,
                self.syncer.sync_issues(SyncMode::Incremental, started_at),
            )
            .await?,
        );

        Ok(self.finish_run(SyncMode::Incremental, started_at, steps).await)
    }

    /// Fetch every stored group's issues and replace its links.
    pub async fn sync_group_issue_links(&self) -> Result<StepOutcome, ReplicaError> {
        self.sync_resource(ResourceType::GroupIssues).await
    }

    /// Sync a single resource. Groups and the user always run in full;
    /// projects, issues and group issues run incrementally.
    pub async fn sync_resource(&self, resource: ResourceType) -> Result<StepOutcome, ReplicaError> {
        let (started_at, cancel) = self.begin_run(resource.as_str()).await;
        let step = SyncStep::from(resource);

        let outcome = match resource {
            ResourceType::User => {
                self.run_step(step, &cancel, self.syncer.sync_user(started_at))
                    .await?
            }
            ResourceType::Groups => {
                self.run_step(step, &cancel, self.syncer.sync_groups(started_at))
                    .await?
            }
            ResourceType::Projects => {
                self.run_step(
                    step,
                    &cancel,
                    self.syncer.sync_projects(SyncMode::Incremental, started_at),
                )
                .await?
            }
            ResourceType::Issues => {
                self.run_step(
                    step,
                    &cancel,
                    self.syncer.sync_issues(SyncMode::Incremental, started_at),
                )
                .await?
            }
            ResourceType::GroupIssues => {
                self.run_step(
                    step,
                    &cancel,
                    self.syncer.sync_group_issue_links(started_at, &cancel),
                )
                .await?
            }
        };

        *self.state.write().await = SyncState::Completed;
        Ok(outcome)
    }

    /// True when the replica holds no groups and no projects. A store that
    /// cannot be read also needs a full sync.
    pub async fn needs_full_sync(&self) -> bool {
        match self.store.is_empty().await {
            Ok(empty) => empty,
            Err(e) => {
                log::warn!("[sync] Cannot inspect replica, assuming empty: {}", e);
                true
            }
        }
    }

    /// Fill an empty replica with a full sync. A failure is reported as
    /// [`Bootstrap::Degraded`] rather than an error.
    pub async fn bootstrap(&self) -> Bootstrap {
        if !self.needs_full_sync().await {
            return Bootstrap::Ready;
        }

        log::info!("[sync] Replica is empty; running initial full sync");
        match self.sync_all().await {
            Ok(report) => Bootstrap::Synced(report),
            Err(e) => {
                log::warn!("[sync] Initial full sync failed, falling back to remote reads: {}", e);
                Bootstrap::Degraded(e)
            }
        }
    }

    /// Watermarks of every resource and whether a full sync is overdue.
    pub async fn status_report(&self) -> Result<StatusReport, ReplicaError> {
        let mut resources = Vec::with_capacity(ResourceType::ALL.len());
        let mut groups_watermark: Option<SyncWatermark> = None;

        for resource in ResourceType::ALL {
            let watermark = self.store.get_watermark(resource).await?;
            resources.push(ResourceStatus {
                resource,
                last_synced_at: watermark.as_ref().map(|w| w.last_synced_at),
                is_full_sync: watermark.as_ref().is_some_and(|w| w.is_full_sync),
            });
            if resource == ResourceType::Groups {
                groups_watermark = watermark;
            }
        }

        let stale_hint = groups_watermark
            .and_then(|w| w.last_full_sync_at)
            .filter(|at| Utc::now() - *at > Duration::days(self.config.stale_after_days))
            .map(|_| {
                format!(
                    "last full sync > {} days ago, consider running a full sync",
                    self.config.stale_after_days
                )
            });

        Ok(StatusReport {
            resources,
            stale_hint,
        })
    }

    /// Capture the run's start time and hand out a fresh cancellation token.
    async fn begin_run(&self, label: &str) -> (DateTime<Utc>, CancellationToken) {
        let previous = *self.state.read().await;
        if previous.is_running() {
            log::warn!("[sync] Starting {} sync while another run is in progress", label);
        }

        let token = CancellationToken::new();
        *self.cancel.write().await = token.clone();

        let started_at = Utc::now();
        log::info!("[sync] {} sync starting", label);
        (started_at, token)
    }

    async fn run_step<F>(
        &self,
        step: SyncStep,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<StepOutcome, ReplicaError>
    where
        F: Future<Output = Result<StepOutcome, ReplicaError>>,
    {
        *self.state.write().await = SyncState::Running(step);

        let result = if cancel.is_cancelled() {
            Err(ReplicaError::cancelled())
        } else {
            work.await
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                *self.state.write().await = SyncState::Failed(step);
                log::error!("[sync] Step {} failed: {}", step, e);
                Err(ReplicaError::step_failed(step, e))
            }
        }
    }

    async fn finish_run(
        &self,
        mode: SyncMode,
        started_at: DateTime<Utc>,
        steps: Vec<StepOutcome>,
    ) -> SyncReport {
        *self.state.write().await = SyncState::Completed;
        log::info!(
            "[sync] {} sync complete in {} ms",
            mode,
            (Utc::now() - started_at).num_milliseconds()
        );
        SyncReport {
            mode,
            started_at,
            steps,
        }
    }
}
