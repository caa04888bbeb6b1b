//! Per-resource sync watermarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Logical resources that carry a watermark row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Groups,
    Projects,
    Issues,
    GroupIssues,
}

impl ResourceType {
    /// Every resource, in status-report order.
    pub const ALL: [ResourceType; 5] = [
        Self::User,
        Self::Groups,
        Self::Projects,
        Self::Issues,
        Self::GroupIssues,
    ];

    /// Resources stamped at the end of a full sync.
    pub const FULL_SYNC: [ResourceType; 4] =
        [Self::Groups, Self::Projects, Self::Issues, Self::User];

    /// Key stored in `sync_watermarks.resource_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Groups => "groups",
            Self::Projects => "projects",
            Self::Issues => "issues",
            Self::GroupIssues => "group_issues",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "groups" => Ok(Self::Groups),
            "projects" => Ok(Self::Projects),
            "issues" => Ok(Self::Issues),
            "group_issues" => Ok(Self::GroupIssues),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}

/// The point up to which a resource was last successfully synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncWatermark {
    pub resource: ResourceType,

    /// Start time of the run that last advanced this watermark.
    pub last_synced_at: DateTime<Utc>,

    /// Whether the last advancing sync was a full sync.
    pub is_full_sync: bool,

    /// Most recent full sync, kept even after later incremental runs.
    pub last_full_sync_at: Option<DateTime<Utc>>,
}

/// Convert a timestamp to the Unix-millisecond form stored in SQLite.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Inverse of [`to_millis`]. Out-of-range values clamp to the epoch.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_round_trip_keys() {
        for resource in ResourceType::ALL {
            assert_eq!(resource.as_str().parse::<ResourceType>().unwrap(), resource);
        }
        assert!("merge_requests".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_millis_conversion_keeps_precision() {
        let at = DateTime::parse_from_rfc3339("2024-01-15T10:30:00.123Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(from_millis(to_millis(at)), at);
    }
}
