//! GitLab group model.

use super::{EntityKind, ReplicaRecord};
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{FromRow, Sqlite};

/// Replicated GitLab group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// GitLab group ID.
    pub id: i64,

    /// Display name (e.g., "Platform").
    pub name: String,

    /// URL path segment (e.g., "platform").
    pub path: String,

    /// Full display name including parents (e.g., "Acme / Platform").
    pub full_name: String,

    /// Full path including parents (e.g., "acme/platform").
    pub full_path: String,

    pub description: String,

    /// `private`, `internal` or `public`.
    pub visibility: String,

    pub web_url: String,

    /// Parent group ID for subgroups.
    pub parent_id: Option<i64>,

    /// RFC 3339 creation timestamp from GitLab.
    pub created_at: Option<String>,

    /// When this row was last written locally (Unix seconds).
    #[serde(default)]
    pub synced_at: i64,
}

pub(crate) const UPSERT_GROUP_SQL: &str = r#"
    INSERT INTO groups (
        id, name, path, full_name, full_path, description, visibility,
        web_url, parent_id, created_at, synced_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        path = excluded.path,
        full_name = excluded.full_name,
        full_path = excluded.full_path,
        description = excluded.description,
        visibility = excluded.visibility,
        web_url = excluded.web_url,
        parent_id = excluded.parent_id,
        created_at = excluded.created_at,
        synced_at = excluded.synced_at
"#;

impl ReplicaRecord for Group {
    const KIND: EntityKind = EntityKind::Groups;

    fn id(&self) -> i64 {
        self.id
    }

    fn upsert_query(&self, synced_at: i64) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        sqlx::query(UPSERT_GROUP_SQL)
            .bind(self.id)
            .bind(&self.name)
            .bind(&self.path)
            .bind(&self.full_name)
            .bind(&self.full_path)
            .bind(&self.description)
            .bind(&self.visibility)
            .bind(&self.web_url)
            .bind(self.parent_id)
            .bind(&self.created_at)
            .bind(synced_at)
    }
}
