//! Conversion from GitLab API payloads to replica entities.

use crate::models::{CurrentUser, Group, Issue, IssueUser, Project};
use crate::services::gitlab_client::{
    GitLabGroup, GitLabIssue, GitLabProject, GitLabUser, GitLabUserRef,
};
use chrono::{DateTime, SecondsFormat, Utc};

/// Normalise a remote timestamp to fixed-width RFC 3339 UTC.
///
/// Fixed width keeps lexical order equal to chronological order in SQLite.
/// Values that do not parse are kept verbatim.
pub fn normalize_timestamp(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        Err(_) => Some(raw.to_string()),
    }
}

/// Format a watermark as an API filter value.
pub fn to_api_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn group(g: GitLabGroup) -> Group {
    Group {
        id: g.id,
        full_name: g.full_name.unwrap_or_else(|| g.name.clone()),
        name: g.name,
        path: g.path,
        full_path: g.full_path,
        description: g.description.unwrap_or_default(),
        visibility: g.visibility.unwrap_or_default(),
        web_url: g.web_url,
        parent_id: g.parent_id,
        created_at: normalize_timestamp(g.created_at.as_deref()),
        synced_at: 0,
    }
}

/// Whether a project may enter the replica.
pub fn is_active_project(p: &GitLabProject) -> bool {
    !p.archived && p.marked_for_deletion_on.is_none()
}

pub fn project(p: GitLabProject) -> Project {
    Project {
        id: p.id,
        name: p.name,
        path: p.path,
        path_with_namespace: p.path_with_namespace,
        name_with_namespace: p.name_with_namespace,
        description: p.description.unwrap_or_default(),
        default_branch: p.default_branch,
        visibility: p.visibility.unwrap_or_default(),
        web_url: p.web_url,
        namespace_id: p.namespace.map(|ns| ns.id),
        created_at: normalize_timestamp(p.created_at.as_deref()),
        updated_at: normalize_timestamp(p.updated_at.as_deref()),
        last_activity_at: normalize_timestamp(p.last_activity_at.as_deref()),
        archived: p.archived,
        open_issues_count: p.open_issues_count.unwrap_or(0),
        synced_at: 0,
    }
}

/// Drop archived and deletion-marked projects, convert the rest.
pub fn active_projects(projects: Vec<GitLabProject>) -> Vec<Project> {
    projects
        .into_iter()
        .filter(is_active_project)
        .map(project)
        .collect()
}

fn issue_user(u: GitLabUserRef) -> IssueUser {
    IssueUser {
        id: u.id,
        name: u.name,
        username: u.username,
    }
}

pub fn issue(i: GitLabIssue) -> Issue {
    Issue {
        id: i.id,
        iid: i.iid,
        project_id: i.project_id,
        title: i.title,
        state: i.state,
        description: i.description.unwrap_or_default(),
        web_url: i.web_url,
        author: i.author.map(issue_user).unwrap_or_default(),
        labels: i.labels,
        assignees: i.assignees.into_iter().map(issue_user).collect(),
        created_at: normalize_timestamp(i.created_at.as_deref()),
        updated_at: normalize_timestamp(i.updated_at.as_deref()),
        closed_at: normalize_timestamp(i.closed_at.as_deref()),
        // Dates stay `YYYY-MM-DD`.
        due_date: i.due_date,
        weight: i.weight,
        confidential: i.confidential,
        synced_at: 0,
    }
}

pub fn current_user(u: GitLabUser) -> CurrentUser {
    CurrentUser {
        id: u.id,
        name: u.name,
        username: u.username,
        email: u.email.unwrap_or_default(),
        web_url: u.web_url.unwrap_or_default(),
        synced_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gitlab_client::GitLabNamespace;

    fn gitlab_project(id: i64) -> GitLabProject {
        GitLabProject {
            id,
            name: format!("p{}", id),
            path: format!("p{}", id),
            name_with_namespace: format!("Acme / p{}", id),
            path_with_namespace: format!("acme/p{}", id),
            description: None,
            default_branch: Some("main".to_string()),
            visibility: Some("internal".to_string()),
            web_url: format!("https://gitlab.com/acme/p{}", id),
            namespace: Some(GitLabNamespace {
                id: 3,
                full_path: Some("acme".to_string()),
            }),
            created_at: Some("2024-01-01T10:00:00+02:00".to_string()),
            updated_at: None,
            last_activity_at: None,
            archived: false,
            marked_for_deletion_on: None,
            open_issues_count: None,
        }
    }

    #[test]
    fn test_normalize_timestamp_to_utc() {
        assert_eq!(
            normalize_timestamp(Some("2024-01-01T10:00:00+02:00")).as_deref(),
            Some("2024-01-01T08:00:00.000Z")
        );
        assert_eq!(
            normalize_timestamp(Some("2024-03-05T12:34:56.789Z")).as_deref(),
            Some("2024-03-05T12:34:56.789Z")
        );
        assert_eq!(normalize_timestamp(Some("")), None);
        assert_eq!(normalize_timestamp(None), None);
        assert_eq!(normalize_timestamp(Some("yesterday")).as_deref(), Some("yesterday"));
    }

    #[test]
    fn test_active_projects_filters_archived_and_deleted() {
        let mut archived = gitlab_project(2);
        archived.archived = true;
        let mut doomed = gitlab_project(3);
        doomed.marked_for_deletion_on = Some("2024-06-01".to_string());

        let kept = active_projects(vec![gitlab_project(1), archived, doomed]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
        assert_eq!(kept[0].namespace_id, Some(3));
        assert_eq!(kept[0].created_at.as_deref(), Some("2024-01-01T08:00:00.000Z"));
    }

    #[test]
    fn test_issue_without_author_gets_empty_user() {
        let converted = issue(GitLabIssue {
            id: 1,
            iid: 1,
            project_id: 5,
            title: "t".to_string(),
            state: "opened".to_string(),
            description: None,
            web_url: "https://gitlab.com/acme/p5/-/issues/1".to_string(),
            author: None,
            labels: vec!["b".to_string(), "a".to_string()],
            assignees: vec![],
            created_at: None,
            updated_at: None,
            closed_at: None,
            due_date: Some("2024-02-01".to_string()),
            weight: None,
            confidential: true,
        });

        assert_eq!(converted.author, IssueUser::default());
        assert_eq!(converted.labels, vec!["b", "a"]);
        assert_eq!(converted.due_date.as_deref(), Some("2024-02-01"));
        assert!(converted.description.is_empty());
    }

    #[test]
    fn test_group_full_name_falls_back_to_name() {
        let converted = group(GitLabGroup {
            id: 1,
            name: "Acme".to_string(),
            path: "acme".to_string(),
            full_name: None,
            full_path: "acme".to_string(),
            description: None,
            visibility: None,
            web_url: "https://gitlab.com/groups/acme".to_string(),
            parent_id: None,
            created_at: None,
        });

        assert_eq!(converted.full_name, "Acme");
    }
}
