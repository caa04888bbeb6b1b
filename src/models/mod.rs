//! Data models for the local replica.
//!
//! Each remote resource has exactly one canonical entity type here. Entities
//! derive `FromRow` (or implement it by hand where columns are flattened) and
//! know how to build their own upsert statement through [`ReplicaRecord`].

pub mod group;
pub mod issue;
pub mod project;
pub mod user;
pub mod watermark;

use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

// Re-exports for convenient access
pub use group::Group;
pub use issue::{Issue, IssueFilter, IssueUser};
pub use project::Project;
pub use user::CurrentUser;
pub use watermark::{ResourceType, SyncWatermark};

/// Collections of the replica that can be upserted and pruned by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Groups,
    Projects,
    Issues,
}

impl EntityKind {
    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Groups => "groups",
            Self::Projects => "projects",
            Self::Issues => "issues",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// A replica row keyed by its stable remote id.
pub trait ReplicaRecord {
    /// The collection this record belongs to.
    const KIND: EntityKind;

    /// Stable remote id.
    fn id(&self) -> i64;

    /// Insert-or-update statement for this record, stamped with `synced_at`.
    fn upsert_query(&self, synced_at: i64) -> Query<'_, Sqlite, SqliteArguments<'_>>;
}
