//! Sync run vocabulary: steps, modes, run state and per-step outcomes.
//!
//! These types are reported by the orchestrator so callers can observe which
//! step is running and which one failed.

use crate::models::watermark::ResourceType;
use serde::Serialize;

/// One step of an orchestrated sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStep {
    /// Fetch the authenticated user.
    User,

    /// Fetch all groups (always full).
    Groups,

    /// Fetch projects.
    Projects,

    /// Fetch issues assigned to the current user.
    Issues,

    /// Fetch each stored group's issues and relink them.
    GroupIssueLinks,

    /// Stamp the full-sync watermarks at the end of a full run.
    StampWatermarks,
}

impl SyncStep {
    /// The watermark row this step advances, if any.
    pub fn resource(self) -> Option<ResourceType> {
        match self {
            Self::User => Some(ResourceType::User),
            Self::Groups => Some(ResourceType::Groups),
            Self::Projects => Some(ResourceType::Projects),
            Self::Issues => Some(ResourceType::Issues),
            Self::GroupIssueLinks => Some(ResourceType::GroupIssues),
            Self::StampWatermarks => None,
        }
    }
}

impl From<ResourceType> for SyncStep {
    fn from(resource: ResourceType) -> Self {
        match resource {
            ResourceType::User => Self::User,
            ResourceType::Groups => Self::Groups,
            ResourceType::Projects => Self::Projects,
            ResourceType::Issues => Self::Issues,
            ResourceType::GroupIssues => Self::GroupIssueLinks,
        }
    }
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Groups => write!(f, "groups"),
            Self::Projects => write!(f, "projects"),
            Self::Issues => write!(f, "issues"),
            Self::GroupIssueLinks => write!(f, "group_issue_links"),
            Self::StampWatermarks => write!(f, "stamp_watermarks"),
        }
    }
}

/// How a resource is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Unfiltered fetch followed by pruning of everything not fetched.
    Full,

    /// Fetch records changed since the watermark; never prunes.
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum SyncState {
    /// No run has started yet.
    #[default]
    Idle,

    /// A run is executing the given step.
    Running(SyncStep),

    /// The last run finished every step.
    Completed,

    /// The last run aborted at the given step.
    Failed(SyncStep),
}

impl SyncState {
    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

/// Result of one successful step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// The step that ran.
    pub step: SyncStep,

    /// The mode actually used (incremental falls back to full without a watermark).
    pub mode: SyncMode,

    /// Number of records fetched from the remote after filtering.
    pub fetched: usize,

    /// Number of local rows removed by pruning.
    pub pruned: u64,
}

impl StepOutcome {
    pub(crate) fn new(step: SyncStep, mode: SyncMode, fetched: usize, pruned: u64) -> Self {
        Self {
            step,
            mode,
            fetched,
            pruned,
        }
    }
}
