//! hims-sync-core - Offline change synchronization for the hospital information system
//!
//! This crate contains the change queue and conflict models, the entity
//! table registry, the libSQL storage layer, and the push/pull/resolve
//! pipeline shared by the API server and the CLI.

pub mod db;
mod engine;
pub mod error;
pub mod models;
pub mod registry;
pub mod sync;
pub mod util;

pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use registry::Registry;
pub use sync::{DisjointMergePolicy, SyncSettings};
