//! Transactional persistence for the replica.
//!
//! Every write is its own transaction: a batch upsert, a prune, a link
//! replacement and a watermark write either commit completely or not at all.

use crate::db::pool::DbPool;
use crate::error::ReplicaError;
use crate::models::issue::ISSUE_COLUMNS;
use crate::models::watermark::{from_millis, to_millis};
use crate::models::{
    CurrentUser, EntityKind, Group, Issue, IssueFilter, Project, ReplicaRecord, ResourceType,
    SyncWatermark,
};
use chrono::{DateTime, Utc};
use sqlx::{Executor, QueryBuilder, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Ids per `DELETE ... IN (...)` statement, well below SQLite's bind limit.
const PRUNE_CHUNK_SIZE: usize = 500;

const GROUP_COLUMNS: &str = "id, name, path, full_name, full_path, description, visibility, \
     web_url, parent_id, created_at, synced_at";

const PROJECT_COLUMNS: &str = "id, name, path, path_with_namespace, name_with_namespace, \
     description, default_branch, visibility, web_url, namespace_id, created_at, updated_at, \
     last_activity_at, archived, open_issues_count, synced_at";

const SET_WATERMARK_SQL: &str = r#"
    INSERT INTO sync_watermarks (resource_type, last_synced_at, is_full_sync, last_full_sync_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(resource_type) DO UPDATE SET
        last_synced_at = MAX(sync_watermarks.last_synced_at, excluded.last_synced_at),
        is_full_sync = excluded.is_full_sync,
        last_full_sync_at = CASE
            WHEN excluded.last_full_sync_at IS NULL THEN sync_watermarks.last_full_sync_at
            WHEN sync_watermarks.last_full_sync_at IS NULL THEN excluded.last_full_sync_at
            ELSE MAX(sync_watermarks.last_full_sync_at, excluded.last_full_sync_at)
        END
"#;

/// Get the current Unix timestamp.
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Write one watermark row on any executor (pool or open transaction).
async fn write_watermark<'e, E>(
    executor: E,
    resource: ResourceType,
    at: DateTime<Utc>,
    full: bool,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ms = to_millis(at);
    sqlx::query(SET_WATERMARK_SQL)
        .bind(resource.as_str())
        .bind(ms)
        .bind(full)
        .bind(full.then_some(ms))
        .execute(executor)
        .await?;
    Ok(())
}

/// The local replica: groups, projects, issues, the current user, group/issue
/// links and per-resource watermarks.
#[derive(Debug, Clone)]
pub struct ReplicaStore {
    pool: DbPool,
}

impl ReplicaStore {
    /// Wrap an already-migrated pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (creating and migrating if needed) the replica at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self, ReplicaError> {
        let pool = crate::db::initialize(db_path).await?;
        Ok(Self::new(pool))
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Insert or update a batch of records keyed by id, all-or-nothing.
    ///
    /// Returns the number of records written.
    pub async fn upsert_many<E: ReplicaRecord>(&self, records: &[E]) -> Result<usize, ReplicaError> {
        if records.is_empty() {
            return Ok(0);
        }

        let synced_at = now();
        let mut tx = self.pool.begin().await?;
        for record in records {
            record
                .upsert_query(synced_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    ReplicaError::storage_with_op(
                        e.to_string(),
                        format!("upsert {} {}", E::KIND, record.id()),
                    )
                })?;
        }
        tx.commit().await?;

        log::debug!("[store] Upserted {} {}", records.len(), E::KIND);
        Ok(records.len())
    }

    /// Replace the stored current user.
    pub async fn upsert_current_user(&self, user: &CurrentUser) -> Result<(), ReplicaError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO current_user (id, name, username, email, web_url, synced_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                username = excluded.username,
                email = excluded.email,
                web_url = excluded.web_url,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.web_url)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        // A different token means a different user; keep only one row.
        sqlx::query("DELETE FROM current_user WHERE id != ?")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete every stored row of `kind` whose id is not in `active_ids`.
    ///
    /// An empty `active_ids` means the remote has nothing of this kind and
    /// wipes the table. Link rows of removed groups or issues cascade.
    /// Returns the number of rows removed.
    pub async fn prune(&self, kind: EntityKind, active_ids: &[i64]) -> Result<u64, ReplicaError> {
        let table = kind.table();
        let mut tx = self.pool.begin().await?;

        let removed = if active_ids.is_empty() {
            let sql = format!("DELETE FROM {}", table);
            sqlx::query(&sql).execute(&mut *tx).await?.rows_affected()
        } else {
            let active: HashSet<i64> = active_ids.iter().copied().collect();
            let sql = format!("SELECT id FROM {}", table);
            let stored: Vec<i64> = sqlx::query_scalar(&sql).fetch_all(&mut *tx).await?;
            let stale: Vec<i64> = stored
                .into_iter()
                .filter(|id| !active.contains(id))
                .collect();

            let mut removed = 0;
            for chunk in stale.chunks(PRUNE_CHUNK_SIZE) {
                let mut builder: QueryBuilder<Sqlite> =
                    QueryBuilder::new(format!("DELETE FROM {} WHERE id IN (", table));
                let mut ids = builder.separated(", ");
                for id in chunk {
                    ids.push_bind(*id);
                }
                ids.push_unseparated(")");
                removed += builder.build().execute(&mut *tx).await?.rows_affected();
            }
            removed
        };

        tx.commit().await?;

        if removed > 0 {
            log::info!("[store] Pruned {} stale {}", removed, kind);
        }
        Ok(removed)
    }

    /// Replace the link set of one group: delete all its links, insert `issue_ids`.
    pub async fn replace_group_issue_links(
        &self,
        group_id: i64,
        issue_ids: &[i64],
    ) -> Result<(), ReplicaError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM group_issues WHERE group_id = ?")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        for issue_id in issue_ids {
            sqlx::query("INSERT OR IGNORE INTO group_issues (group_id, issue_id) VALUES (?, ?)")
                .bind(group_id)
                .bind(issue_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Advance a watermark. `last_synced_at` never moves backwards.
    pub async fn set_watermark(
        &self,
        resource: ResourceType,
        at: DateTime<Utc>,
        full: bool,
    ) -> Result<(), ReplicaError> {
        write_watermark(&self.pool, resource, at, full).await?;
        Ok(())
    }

    /// Mark several resources as fully synced at `at`, in one transaction.
    pub async fn stamp_full_sync(
        &self,
        resources: &[ResourceType],
        at: DateTime<Utc>,
    ) -> Result<(), ReplicaError> {
        let mut tx = self.pool.begin().await?;
        for resource in resources {
            write_watermark(&mut *tx, *resource, at, true).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// All groups ordered by name.
    pub async fn list_groups(&self) -> Result<Vec<Group>, ReplicaError> {
        let sql = format!("SELECT {} FROM groups ORDER BY name COLLATE NOCASE, id", GROUP_COLUMNS);
        Ok(sqlx::query_as::<_, Group>(&sql).fetch_all(&self.pool).await?)
    }

    /// All non-archived projects ordered by name.
    pub async fn list_projects(&self) -> Result<Vec<Project>, ReplicaError> {
        let sql = format!(
            "SELECT {} FROM projects WHERE archived = 0 ORDER BY name COLLATE NOCASE, id",
            PROJECT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Project>(&sql).fetch_all(&self.pool).await?)
    }

    /// Issues matching `filter`, most recently updated first.
    pub async fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>, ReplicaError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM issues i", ISSUE_COLUMNS));

        if filter.group_id.is_some() {
            builder.push(" JOIN group_issues gi ON gi.issue_id = i.id");
        }
        builder.push(" WHERE 1 = 1");
        if let Some(group_id) = filter.group_id {
            builder.push(" AND gi.group_id = ").push_bind(group_id);
        }
        if let Some(project_id) = filter.project_id {
            builder.push(" AND i.project_id = ").push_bind(project_id);
        }
        if let Some(state) = &filter.state {
            builder.push(" AND i.state = ").push_bind(state.clone());
        }
        builder.push(" ORDER BY i.updated_at DESC, i.id DESC");

        Ok(builder.build_query_as::<Issue>().fetch_all(&self.pool).await?)
    }

    /// Issues linked to a group, most recently updated first.
    pub async fn list_issues_by_group(&self, group_id: i64) -> Result<Vec<Issue>, ReplicaError> {
        self.list_issues(&IssueFilter::for_group(group_id)).await
    }

    /// Issue ids currently linked to a group.
    pub async fn linked_issue_ids(&self, group_id: i64) -> Result<Vec<i64>, ReplicaError> {
        Ok(sqlx::query_scalar(
            "SELECT issue_id FROM group_issues WHERE group_id = ? ORDER BY issue_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_group(&self, id: i64) -> Result<Group, ReplicaError> {
        let sql = format!("SELECT {} FROM groups WHERE id = ?", GROUP_COLUMNS);
        sqlx::query_as::<_, Group>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReplicaError::not_found_with_id("Group", id))
    }

    pub async fn get_project(&self, id: i64) -> Result<Project, ReplicaError> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS);
        sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReplicaError::not_found_with_id("Project", id))
    }

    pub async fn get_issue(&self, id: i64) -> Result<Issue, ReplicaError> {
        let sql = format!("SELECT {} FROM issues i WHERE i.id = ?", ISSUE_COLUMNS);
        sqlx::query_as::<_, Issue>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReplicaError::not_found_with_id("Issue", id))
    }

    /// Look up an issue by its user-facing identity.
    pub async fn get_issue_by_iid(&self, project_id: i64, iid: i64) -> Result<Issue, ReplicaError> {
        let sql = format!(
            "SELECT {} FROM issues i WHERE i.project_id = ? AND i.iid = ?",
            ISSUE_COLUMNS
        );
        sqlx::query_as::<_, Issue>(&sql)
            .bind(project_id)
            .bind(iid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReplicaError::not_found_with_id("Issue", format!("{}#{}", project_id, iid)))
    }

    pub async fn get_current_user(&self) -> Result<CurrentUser, ReplicaError> {
        sqlx::query_as::<_, CurrentUser>(
            "SELECT id, name, username, email, web_url, synced_at FROM current_user LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ReplicaError::not_found("CurrentUser"))
    }

    /// Number of stored rows of `kind`.
    pub async fn count(&self, kind: EntityKind) -> Result<i64, ReplicaError> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    /// True when no groups and no projects have been synced yet.
    pub async fn is_empty(&self) -> Result<bool, ReplicaError> {
        Ok(self.count(EntityKind::Groups).await? == 0
            && self.count(EntityKind::Projects).await? == 0)
    }

    /// Watermark of `resource`, or `None` if it was never synced.
    pub async fn get_watermark(
        &self,
        resource: ResourceType,
    ) -> Result<Option<SyncWatermark>, ReplicaError> {
        let row: Option<(i64, bool, Option<i64>)> = sqlx::query_as(
            "SELECT last_synced_at, is_full_sync, last_full_sync_at FROM sync_watermarks WHERE resource_type = ?",
        )
        .bind(resource.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(last, full, last_full)| SyncWatermark {
            resource,
            last_synced_at: from_millis(last),
            is_full_sync: full,
            last_full_sync_at: last_full.map(from_millis),
        }))
    }
}
