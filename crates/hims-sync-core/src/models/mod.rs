//! Data models for hims-sync

mod change;
mod conflict;
mod feed;
mod record;

pub use change::{
    ChangeId, ChangeOutcome, ChangeResult, ChangeStatus, IncomingChange, Operation, PushBatch,
    PushResult, QueuedChange,
};
pub use conflict::{ConflictId, ConflictType, Resolution, ResolveRequest, SyncConflict};
pub use feed::{FeedEntry, PullRequest, PullResult, SyncStatusSummary};
pub use record::ServerRecord;

/// Opaque field → value mapping carried by changes and conflicts
pub type Payload = serde_json::Map<String, serde_json::Value>;
