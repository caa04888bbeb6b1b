//! Shared fixtures for integration tests: an in-memory GitLab and a temp-dir
//! replica.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use gitlab_replica::db::replica_store::ReplicaStore;
use gitlab_replica::error::ReplicaError;
use gitlab_replica::services::gitlab_client::{
    GitLabGroup, GitLabIssue, GitLabNamespace, GitLabProject, GitLabUser, GitLabUserRef,
};
use gitlab_replica::services::remote::{GroupsQuery, IssuesQuery, ProjectsQuery, RemoteSource};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Open a fresh replica in a temp directory. Keep the `TempDir` alive.
pub async fn setup_store() -> (TempDir, ReplicaStore) {
    let dir = tempdir().unwrap();
    let store = ReplicaStore::open(&dir.path().join("replica.db")).await.unwrap();
    (dir, store)
}

/// Remote state and recorded requests.
#[derive(Default)]
pub struct FakeState {
    pub user: Option<GitLabUser>,
    pub groups: Vec<GitLabGroup>,
    pub projects: Vec<GitLabProject>,
    pub issues: Vec<GitLabIssue>,
    pub group_issues: HashMap<i64, Vec<GitLabIssue>>,

    /// Endpoints that fail: "user", "groups", "projects", "issues" or "group:<id>".
    pub failing: HashSet<String>,

    /// Delay before every group issues page.
    pub group_page_delay: Option<Duration>,

    pub project_queries: Vec<ProjectsQuery>,
    pub issue_queries: Vec<IssuesQuery>,
    pub group_issue_queries: Vec<(i64, IssuesQuery)>,
}

/// In-memory [`RemoteSource`] with server-side filtering and pagination.
#[derive(Default)]
pub struct FakeRemote {
    pub state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.state.lock().unwrap().user = Some(user(1, "ada"));
        remote
    }

    pub fn with<F: FnOnce(&mut FakeState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn fail(&self, endpoint: &str) {
        self.state.lock().unwrap().failing.insert(endpoint.to_string());
    }

    pub fn recover(&self, endpoint: &str) {
        self.state.lock().unwrap().failing.remove(endpoint);
    }

    fn check(&self, endpoint: &str) -> Result<(), ReplicaError> {
        if self.state.lock().unwrap().failing.contains(endpoint) {
            Err(ReplicaError::transport_full("Service unavailable", 503, endpoint))
        } else {
            Ok(())
        }
    }
}

fn parse(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts).ok().map(|t| t.with_timezone(&Utc))
}

/// Strictly after `bound`; records without a timestamp never match a filter.
fn after(value: Option<&str>, bound: Option<&str>) -> bool {
    match bound {
        None => true,
        Some(bound) => match (value.and_then(parse), parse(bound)) {
            (Some(v), Some(b)) => v > b,
            _ => false,
        },
    }
}

fn page_of<T: Clone>(items: &[T], page: u32, per_page: u32) -> Vec<T> {
    let start = ((page.max(1) - 1) * per_page) as usize;
    items.iter().skip(start).take(per_page as usize).cloned().collect()
}

impl RemoteSource for FakeRemote {
    async fn current_user(&self) -> Result<GitLabUser, ReplicaError> {
        self.check("user")?;
        self.state
            .lock()
            .unwrap()
            .user
            .clone()
            .ok_or_else(|| ReplicaError::transport_full("Unauthorized", 401, "user"))
    }

    async fn groups_page(&self, query: GroupsQuery) -> Result<Vec<GitLabGroup>, ReplicaError> {
        self.check("groups")?;
        let state = self.state.lock().unwrap();
        Ok(page_of(&state.groups, query.page, query.per_page))
    }

    async fn projects_page(&self, query: ProjectsQuery) -> Result<Vec<GitLabProject>, ReplicaError> {
        self.check("projects")?;
        let mut state = self.state.lock().unwrap();
        state.project_queries.push(query.clone());
        let matching: Vec<GitLabProject> = state
            .projects
            .iter()
            .filter(|p| after(p.last_activity_at.as_deref(), query.last_activity_after.as_deref()))
            .cloned()
            .collect();
        Ok(page_of(&matching, query.page, query.per_page))
    }

    async fn issues_page(&self, query: IssuesQuery) -> Result<Vec<GitLabIssue>, ReplicaError> {
        self.check("issues")?;
        let mut state = self.state.lock().unwrap();
        state.issue_queries.push(query.clone());
        let matching: Vec<GitLabIssue> = state
            .issues
            .iter()
            .filter(|i| after(i.updated_at.as_deref(), query.updated_after.as_deref()))
            .cloned()
            .collect();
        Ok(page_of(&matching, query.page, query.per_page))
    }

    async fn group_issues_page(
        &self,
        group_id: i64,
        query: IssuesQuery,
    ) -> Result<Vec<GitLabIssue>, ReplicaError> {
        let delay = self.state.lock().unwrap().group_page_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(&format!("group:{}", group_id))?;

        let mut state = self.state.lock().unwrap();
        state.group_issue_queries.push((group_id, query.clone()));
        let matching: Vec<GitLabIssue> = state
            .group_issues
            .get(&group_id)
            .map(|issues| {
                issues
                    .iter()
                    .filter(|i| after(i.updated_at.as_deref(), query.updated_after.as_deref()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page_of(&matching, query.page, query.per_page))
    }
}

pub fn user(id: i64, username: &str) -> GitLabUser {
    GitLabUser {
        id,
        username: username.to_string(),
        name: username.to_uppercase(),
        email: Some(format!("{}@example.com", username)),
        web_url: Some(format!("https://gitlab.example.com/{}", username)),
    }
}

pub fn group(id: i64, name: &str) -> GitLabGroup {
    GitLabGroup {
        id,
        name: name.to_string(),
        path: name.to_lowercase(),
        full_name: Some(name.to_string()),
        full_path: name.to_lowercase(),
        description: Some(String::new()),
        visibility: Some("private".to_string()),
        web_url: format!("https://gitlab.example.com/groups/{}", name.to_lowercase()),
        parent_id: None,
        created_at: Some("2024-01-01T00:00:00.000Z".to_string()),
    }
}

pub fn project(id: i64, name: &str, last_activity_at: &str) -> GitLabProject {
    GitLabProject {
        id,
        name: name.to_string(),
        path: name.to_lowercase(),
        name_with_namespace: format!("Acme / {}", name),
        path_with_namespace: format!("acme/{}", name.to_lowercase()),
        description: None,
        default_branch: Some("main".to_string()),
        visibility: Some("private".to_string()),
        web_url: format!("https://gitlab.example.com/acme/{}", name.to_lowercase()),
        namespace: Some(GitLabNamespace {
            id: 1,
            full_path: Some("acme".to_string()),
        }),
        created_at: Some("2024-01-01T00:00:00.000Z".to_string()),
        updated_at: Some(last_activity_at.to_string()),
        last_activity_at: Some(last_activity_at.to_string()),
        archived: false,
        marked_for_deletion_on: None,
        open_issues_count: Some(0),
    }
}

pub fn issue(id: i64, iid: i64, project_id: i64, updated_at: &str) -> GitLabIssue {
    GitLabIssue {
        id,
        iid,
        project_id,
        title: format!("Issue {}", iid),
        state: "opened".to_string(),
        description: Some("details".to_string()),
        web_url: format!("https://gitlab.example.com/acme/p{}/-/issues/{}", project_id, iid),
        author: Some(GitLabUserRef {
            id: 1,
            username: "ada".to_string(),
            name: "Ada".to_string(),
        }),
        labels: vec!["bug".to_string()],
        assignees: vec![],
        created_at: Some("2024-01-01T00:00:00.000Z".to_string()),
        updated_at: Some(updated_at.to_string()),
        closed_at: None,
        due_date: None,
        weight: None,
        confidential: false,
    }
}

/// Sorted ids of a listing.
pub fn ids<T, F: Fn(&T) -> i64>(items: &[T], id: F) -> Vec<i64> {
    let mut ids: Vec<i64> = items.iter().map(id).collect();
    ids.sort_unstable();
    ids
}
