//! GitLab issue model.
//!
//! `labels` and `assignees` are stored as JSON arrays in SQLite; the author is
//! flattened into `author_*` columns, so `FromRow` is implemented by hand.

use super::{EntityKind, ReplicaRecord};
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::types::Json;
use sqlx::{FromRow, Row, Sqlite};

/// A user reference embedded in an issue (author or assignee).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueUser {
    pub id: i64,
    pub name: String,
    pub username: String,
}

/// Replicated GitLab issue.
///
/// Keyed by the global `id`; `(project_id, iid)` is the user-facing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// GitLab issue ID (global).
    pub id: i64,

    /// Project-scoped issue number.
    pub iid: i64,

    pub project_id: i64,

    pub title: String,

    /// `opened` or `closed`.
    pub state: String,

    pub description: String,

    pub web_url: String,

    pub author: IssueUser,

    /// Labels in the order GitLab returned them.
    pub labels: Vec<String>,

    pub assignees: Vec<IssueUser>,

    pub created_at: Option<String>,

    pub updated_at: Option<String>,

    pub closed_at: Option<String>,

    /// Due date as `YYYY-MM-DD`.
    pub due_date: Option<String>,

    pub weight: Option<i64>,

    pub confidential: bool,

    /// When this row was last written locally (Unix seconds).
    #[serde(default)]
    pub synced_at: i64,
}

impl<'r> FromRow<'r, SqliteRow> for Issue {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let labels: Json<Vec<String>> = row.try_get("labels")?;
        let assignees: Json<Vec<IssueUser>> = row.try_get("assignees")?;

        Ok(Self {
            id: row.try_get("id")?,
            iid: row.try_get("iid")?,
            project_id: row.try_get("project_id")?,
            title: row.try_get("title")?,
            state: row.try_get("state")?,
            description: row.try_get("description")?,
            web_url: row.try_get("web_url")?,
            author: IssueUser {
                id: row.try_get("author_id")?,
                name: row.try_get("author_name")?,
                username: row.try_get("author_username")?,
            },
            labels: labels.0,
            assignees: assignees.0,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            closed_at: row.try_get("closed_at")?,
            due_date: row.try_get("due_date")?,
            weight: row.try_get("weight")?,
            confidential: row.try_get("confidential")?,
            synced_at: row.try_get("synced_at")?,
        })
    }
}

pub(crate) const UPSERT_ISSUE_SQL: &str = r#"
    INSERT INTO issues (
        id, iid, project_id, title, state, description, web_url,
        author_id, author_name, author_username, labels, assignees,
        created_at, updated_at, closed_at, due_date, weight, confidential, synced_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        iid = excluded.iid,
        project_id = excluded.project_id,
        title = excluded.title,
        state = excluded.state,
        description = excluded.description,
        web_url = excluded.web_url,
        author_id = excluded.author_id,
        author_name = excluded.author_name,
        author_username = excluded.author_username,
        labels = excluded.labels,
        assignees = excluded.assignees,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        closed_at = excluded.closed_at,
        due_date = excluded.due_date,
        weight = excluded.weight,
        confidential = excluded.confidential,
        synced_at = excluded.synced_at
"#;

/// Column list shared by every issue SELECT.
pub(crate) const ISSUE_COLUMNS: &str = "i.id, i.iid, i.project_id, i.title, i.state, i.description, i.web_url, \
     i.author_id, i.author_name, i.author_username, i.labels, i.assignees, \
     i.created_at, i.updated_at, i.closed_at, i.due_date, i.weight, i.confidential, i.synced_at";

impl ReplicaRecord for Issue {
    const KIND: EntityKind = EntityKind::Issues;

    fn id(&self) -> i64 {
        self.id
    }

    fn upsert_query(&self, synced_at: i64) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        sqlx::query(UPSERT_ISSUE_SQL)
            .bind(self.id)
            .bind(self.iid)
            .bind(self.project_id)
            .bind(&self.title)
            .bind(&self.state)
            .bind(&self.description)
            .bind(&self.web_url)
            .bind(self.author.id)
            .bind(&self.author.name)
            .bind(&self.author.username)
            .bind(Json(&self.labels))
            .bind(Json(&self.assignees))
            .bind(&self.created_at)
            .bind(&self.updated_at)
            .bind(&self.closed_at)
            .bind(&self.due_date)
            .bind(self.weight)
            .bind(self.confidential)
            .bind(synced_at)
    }
}

/// Optional narrowing for issue listings. The default lists every issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueFilter {
    /// Only issues of this project.
    pub project_id: Option<i64>,

    /// Only issues in this state (`opened` / `closed`).
    pub state: Option<String>,

    /// Only issues linked to this group.
    pub group_id: Option<i64>,
}

impl IssueFilter {
    pub fn for_project(project_id: i64) -> Self {
        Self {
            project_id: Some(project_id),
            ..Default::default()
        }
    }

    pub fn for_group(group_id: i64) -> Self {
        Self {
            group_id: Some(group_id),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}
