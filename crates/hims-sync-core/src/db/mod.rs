//! Database layer for hims-sync

mod conflict_repository;
mod connection;
mod entity_store;
mod migrations;
mod queue_repository;
mod transaction;
mod values;

pub use conflict_repository::{ConflictRepository, LibSqlConflictRepository, ResolutionRecord};
pub use connection::Database;
pub use entity_store::{EntityStore, LibSqlEntityStore, NewRow, VersionGuard};
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use transaction::{LibSqlTransactor, Transactor};
