//! Cache-first reads.
//!
//! Reads are served from the replica. When the replica holds nothing for the
//! requested resource (never synced, or bootstrap failed) the reader goes to
//! the remote directly and returns converted records without persisting them.

use crate::db::replica_store::ReplicaStore;
use crate::error::ReplicaError;
use crate::models::{CurrentUser, EntityKind, Group, Issue, IssueFilter, Project};
use crate::services::convert;
use crate::services::remote::{self, fetch_all_pages, IssuesQuery, ProjectsQuery, RemoteSource};
use serde::Serialize;
use std::sync::Arc;

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    Replica,
    Remote,
}

/// Records plus where they came from.
#[derive(Debug, Clone, Serialize)]
pub struct Read<T> {
    pub data: T,
    pub source: ReadSource,
}

impl<T> Read<T> {
    fn replica(data: T) -> Self {
        Self {
            data,
            source: ReadSource::Replica,
        }
    }

    fn remote(data: T) -> Self {
        Self {
            data,
            source: ReadSource::Remote,
        }
    }
}

/// Reads from the replica with a remote fallback.
pub struct ReplicaReader<R: RemoteSource> {
    remote: Arc<R>,
    store: ReplicaStore,
    per_page: u32,
}

impl<R: RemoteSource> ReplicaReader<R> {
    pub fn new(remote: Arc<R>, store: ReplicaStore, per_page: u32) -> Self {
        Self {
            remote,
            store,
            per_page: remote::bounded_page_size(per_page),
        }
    }

    pub async fn groups(&self) -> Result<Read<Vec<Group>>, ReplicaError> {
        let stored = self.store.list_groups().await?;
        if !stored.is_empty() {
            return Ok(Read::replica(stored));
        }

        log::debug!("[sync] No groups stored; reading from remote");
        let groups = remote::all_groups(self.remote.as_ref(), self.per_page)
            .await?
            .into_iter()
            .map(convert::group)
            .collect();
        Ok(Read::remote(groups))
    }

    pub async fn projects(&self) -> Result<Read<Vec<Project>>, ReplicaError> {
        let stored = self.store.list_projects().await?;
        if !stored.is_empty() {
            return Ok(Read::replica(stored));
        }

        log::debug!("[sync] No projects stored; reading from remote");
        let fetched = remote::all_projects(
            self.remote.as_ref(),
            &ProjectsQuery::membership(None),
            self.per_page,
        )
        .await?;
        let mut projects = convert::active_projects(fetched);
        projects.sort_by_key(|p| p.name.to_lowercase());
        Ok(Read::remote(projects))
    }

    /// Issues matching `filter`. A group filter reads that group's issues
    /// from the remote on fallback; otherwise the caller's assigned issues.
    pub async fn issues(&self, filter: &IssueFilter) -> Result<Read<Vec<Issue>>, ReplicaError> {
        let stored = self.store.list_issues(filter).await?;
        if !stored.is_empty() || self.holds_issues(filter).await? {
            return Ok(Read::replica(stored));
        }

        log::debug!("[sync] No matching issues stored; reading from remote");
        let fetched = match filter.group_id {
            Some(group_id) => {
                let remote = self.remote.as_ref();
                let per_page = self.per_page;
                fetch_all_pages(per_page, |page| {
                    remote.group_issues_page(group_id, IssuesQuery::all_states(None).at_page(page, per_page))
                })
                .await?
            }
            None => {
                remote::all_issues(
                    self.remote.as_ref(),
                    &IssuesQuery::assigned_to_me(None),
                    self.per_page,
                )
                .await?
            }
        };

        let mut issues: Vec<Issue> = fetched
            .into_iter()
            .map(convert::issue)
            .filter(|i| filter.project_id.map_or(true, |id| i.project_id == id))
            .filter(|i| filter.state.as_ref().map_or(true, |s| &i.state == s))
            .collect();
        issues.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(Read::remote(issues))
    }

    /// Whether the replica has any issue rows for the filter's scope: the
    /// group's links for a group filter, otherwise the issues table.
    async fn holds_issues(&self, filter: &IssueFilter) -> Result<bool, ReplicaError> {
        match filter.group_id {
            Some(group_id) => Ok(!self.store.linked_issue_ids(group_id).await?.is_empty()),
            None => Ok(self.store.count(EntityKind::Issues).await? > 0),
        }
    }

    pub async fn current_user(&self) -> Result<Read<CurrentUser>, ReplicaError> {
        match self.store.get_current_user().await {
            Ok(user) => Ok(Read::replica(user)),
            Err(e) if e.is_recoverable() => {
                let user = convert::current_user(self.remote.current_user().await?);
                Ok(Read::remote(user))
            }
            Err(e) => Err(e),
        }
    }

    /// One group by id, falling back to the remote listing on a miss.
    pub async fn group(&self, id: i64) -> Result<Read<Group>, ReplicaError> {
        match self.store.get_group(id).await {
            Ok(group) => Ok(Read::replica(group)),
            Err(e) if e.is_recoverable() => {
                let found = remote::all_groups(self.remote.as_ref(), self.per_page)
                    .await?
                    .into_iter()
                    .find(|g| g.id == id)
                    .map(convert::group);
                found.map(Read::remote).ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    /// One issue by project and iid, falling back to the remote on a miss.
    pub async fn issue(&self, project_id: i64, iid: i64) -> Result<Read<Issue>, ReplicaError> {
        match self.store.get_issue_by_iid(project_id, iid).await {
            Ok(issue) => Ok(Read::replica(issue)),
            Err(e) if e.is_recoverable() => {
                let found = remote::all_issues(
                    self.remote.as_ref(),
                    &IssuesQuery::assigned_to_me(None),
                    self.per_page,
                )
                .await?
                .into_iter()
                .find(|i| i.project_id == project_id && i.iid == iid)
                .map(convert::issue);
                found.map(Read::remote).ok_or(e)
            }
            Err(e) => Err(e),
        }
    }
}
