//! Sync services.
//!
//! The remote capability and its GitLab implementation, the streaming fetch
//! primitive, per-resource syncers, the orchestrator and cache-first readers.
//! Nothing here depends on how the replica is presented.

pub mod convert;
pub mod gitlab_client;
pub mod page_stream;
pub mod remote;
pub mod replica_reader;
pub mod resource_syncer;
pub mod sync_events;
pub mod sync_orchestrator;

pub use gitlab_client::GitLabClient;
pub use page_stream::PageStream;
pub use remote::RemoteSource;
pub use replica_reader::{Read, ReadSource, ReplicaReader};
pub use resource_syncer::ResourceSyncer;
pub use sync_events::{StepOutcome, SyncMode, SyncState, SyncStep};
pub use sync_orchestrator::{Bootstrap, StatusReport, SyncOrchestrator, SyncReport};
