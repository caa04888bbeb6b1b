//! GitLab project model.

use super::{EntityKind, ReplicaRecord};
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{FromRow, Sqlite};

/// Replicated GitLab project.
///
/// Archived and deletion-marked projects are filtered out before they reach
/// the store, so `archived` is normally `false` for stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// GitLab project ID.
    pub id: i64,

    /// Short project name (e.g., "GitLab").
    pub name: String,

    pub path: String,

    /// Path with namespace (e.g., "gitlab-org/gitlab").
    pub path_with_namespace: String,

    /// Full namespaced name (e.g., "GitLab.org / GitLab").
    pub name_with_namespace: String,

    pub description: String,

    pub default_branch: Option<String>,

    pub visibility: String,

    pub web_url: String,

    /// Owning namespace (group or user) ID.
    pub namespace_id: Option<i64>,

    pub created_at: Option<String>,

    pub updated_at: Option<String>,

    pub last_activity_at: Option<String>,

    pub archived: bool,

    pub open_issues_count: i64,

    /// When this row was last written locally (Unix seconds).
    #[serde(default)]
    pub synced_at: i64,
}

pub(crate) const UPSERT_PROJECT_SQL: &str = r#"
    INSERT INTO projects (
        id, name, path, path_with_namespace, name_with_namespace, description,
        default_branch, visibility, web_url, namespace_id, created_at,
        updated_at, last_activity_at, archived, open_issues_count, synced_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        path = excluded.path,
        path_with_namespace = excluded.path_with_namespace,
        name_with_namespace = excluded.name_with_namespace,
        description = excluded.description,
        default_branch = excluded.default_branch,
        visibility = excluded.visibility,
        web_url = excluded.web_url,
        namespace_id = excluded.namespace_id,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        last_activity_at = excluded.last_activity_at,
        archived = excluded.archived,
        open_issues_count = excluded.open_issues_count,
        synced_at = excluded.synced_at
"#;

impl ReplicaRecord for Project {
    const KIND: EntityKind = EntityKind::Projects;

    fn id(&self) -> i64 {
        self.id
    }

    fn upsert_query(&self, synced_at: i64) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        sqlx::query(UPSERT_PROJECT_SQL)
            .bind(self.id)
            .bind(&self.name)
            .bind(&self.path)
            .bind(&self.path_with_namespace)
            .bind(&self.name_with_namespace)
            .bind(&self.description)
            .bind(&self.default_branch)
            .bind(&self.visibility)
            .bind(&self.web_url)
            .bind(self.namespace_id)
            .bind(&self.created_at)
            .bind(&self.updated_at)
            .bind(&self.last_activity_at)
            .bind(self.archived)
            .bind(self.open_issues_count)
            .bind(synced_at)
    }
}
