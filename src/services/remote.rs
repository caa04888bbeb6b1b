//! The remote side of the replica.
//!
//! [`RemoteSource`] is a page-level capability; the eager-all and streaming
//! fetch shapes are built on top of it here so every implementation (the GitLab
//! client, test fakes) gets identical pagination semantics.

use crate::error::ReplicaError;
use crate::services::gitlab_client::{GitLabGroup, GitLabIssue, GitLabProject, GitLabUser};
use crate::services::page_stream::{spawn_page_stream, PageStream};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Page size used by every sync fetch (GitLab's maximum).
pub const DEFAULT_PER_PAGE: u32 = 100;

/// GitLab caps `per_page` at 100.
pub const MAX_PER_PAGE: u32 = 100;

/// Clamp a configured page size into `1..=MAX_PER_PAGE`.
pub fn bounded_page_size(per_page: u32) -> u32 {
    let bounded = per_page.clamp(1, MAX_PER_PAGE);
    if bounded != per_page {
        log::warn!("[sync] Page size {} out of range, using {}", per_page, bounded);
    }
    bounded
}

/// Query parameters for listing groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupsQuery {
    pub page: u32,
    pub per_page: u32,
}

/// Query parameters for listing projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectsQuery {
    pub page: u32,
    pub per_page: u32,

    /// Only projects the caller is a member of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,

    /// Return projects with activity after this time (ISO 8601).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_after: Option<String>,
}

/// Query parameters for listing issues (personal or per group).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssuesQuery {
    pub page: u32,
    pub per_page: u32,

    /// Filter by state: `opened`, `closed`, `all`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Filter by scope: `created_by_me`, `assigned_to_me`, `all`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Return issues updated after this time (ISO 8601).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_after: Option<String>,
}

impl GroupsQuery {
    pub fn page(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }
}

impl ProjectsQuery {
    /// Non-archived projects the caller is a member of.
    pub fn membership(last_activity_after: Option<String>) -> Self {
        Self {
            membership: Some(true),
            archived: Some(false),
            last_activity_after,
            ..Default::default()
        }
    }

    pub fn at_page(&self, page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            ..self.clone()
        }
    }
}

impl IssuesQuery {
    /// Issues assigned to the caller.
    pub fn assigned_to_me(updated_after: Option<String>) -> Self {
        Self {
            scope: Some("assigned_to_me".to_string()),
            updated_after,
            ..Default::default()
        }
    }

    /// Issues of a group in every state.
    pub fn all_states(updated_after: Option<String>) -> Self {
        Self {
            state: Some("all".to_string()),
            updated_after,
            ..Default::default()
        }
    }

    pub fn at_page(&self, page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            ..self.clone()
        }
    }
}

/// Paginated access to the remote issue tracker.
///
/// Each call fetches exactly one page. Errors are reported as
/// [`ReplicaError::Transport`] regardless of cause.
pub trait RemoteSource: Send + Sync + 'static {
    /// The user the credentials belong to.
    fn current_user(&self) -> impl Future<Output = Result<GitLabUser, ReplicaError>> + Send;

    fn groups_page(
        &self,
        query: GroupsQuery,
    ) -> impl Future<Output = Result<Vec<GitLabGroup>, ReplicaError>> + Send;

    fn projects_page(
        &self,
        query: ProjectsQuery,
    ) -> impl Future<Output = Result<Vec<GitLabProject>, ReplicaError>> + Send;

    fn issues_page(
        &self,
        query: IssuesQuery,
    ) -> impl Future<Output = Result<Vec<GitLabIssue>, ReplicaError>> + Send;

    fn group_issues_page(
        &self,
        group_id: i64,
        query: IssuesQuery,
    ) -> impl Future<Output = Result<Vec<GitLabIssue>, ReplicaError>> + Send;
}

/// Fetch pages `1..` until a page shorter than `per_page` arrives.
///
/// Any page error fails the whole call; partial results are never returned.
/// A zero page size is rejected before anything is fetched.
pub async fn fetch_all_pages<T, F, Fut>(per_page: u32, mut fetch_page: F) -> Result<Vec<T>, ReplicaError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ReplicaError>>,
{
    check_page_size(per_page)?;
    let mut all = Vec::new();
    let mut page = 1u32;

    loop {
        let items = fetch_page(page).await?;
        let count = items.len();
        all.extend(items);

        if count < per_page as usize {
            break;
        }
        page += 1;
    }

    Ok(all)
}

/// A page size of zero would never produce a short page.
pub(crate) fn check_page_size(per_page: u32) -> Result<(), ReplicaError> {
    if per_page == 0 {
        return Err(ReplicaError::config_field(
            "Page size must be at least 1",
            "per_page",
        ));
    }
    Ok(())
}

/// Every group visible to the caller.
pub async fn all_groups<R: RemoteSource>(
    remote: &R,
    per_page: u32,
) -> Result<Vec<GitLabGroup>, ReplicaError> {
    fetch_all_pages(per_page, |page| remote.groups_page(GroupsQuery::page(page, per_page))).await
}

/// Every project matching `query` (page fields are overwritten).
pub async fn all_projects<R: RemoteSource>(
    remote: &R,
    query: &ProjectsQuery,
    per_page: u32,
) -> Result<Vec<GitLabProject>, ReplicaError> {
    fetch_all_pages(per_page, |page| remote.projects_page(query.at_page(page, per_page))).await
}

/// Every issue matching `query` (page fields are overwritten).
pub async fn all_issues<R: RemoteSource>(
    remote: &R,
    query: &IssuesQuery,
    per_page: u32,
) -> Result<Vec<GitLabIssue>, ReplicaError> {
    fetch_all_pages(per_page, |page| remote.issues_page(query.at_page(page, per_page))).await
}

/// Stream the issues of one group, one record at a time.
pub fn stream_group_issues<R: RemoteSource>(
    remote: Arc<R>,
    group_id: i64,
    query: IssuesQuery,
    per_page: u32,
    cancel: CancellationToken,
) -> PageStream<GitLabIssue> {
    spawn_page_stream(per_page, cancel, move |page| {
        let remote = Arc::clone(&remote);
        let query = query.at_page(page, per_page);
        async move { remote.group_issues_page(group_id, query).await }
    })
}
