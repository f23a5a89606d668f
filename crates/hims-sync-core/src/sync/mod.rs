//! Offline change synchronization pipeline
//!
//! A [`Pipeline`] borrows one storage backend and runs the push, pull and
//! resolution flows against it. [`crate::SyncEngine`] owns the database and
//! builds a pipeline per call.

pub mod applier;
pub mod detector;
pub mod diff;
mod feed;
pub mod merge;
mod processor;
mod resolution;

use std::fmt;
use std::str::FromStr;

use libsql::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{
    LibSqlConflictRepository, LibSqlEntityStore, LibSqlQueueRepository, LibSqlTransactor,
    Transactor,
};
use crate::error::{Error, Result};
use crate::registry::Registry;

/// What gets written when a client edit touches different fields than the server did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisjointMergePolicy {
    /// Write the full client payload
    #[default]
    ClientPayload,
    /// Write only the fields the client changed relative to its base
    ThreeWay,
}

impl DisjointMergePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientPayload => "client_payload",
            Self::ThreeWay => "three_way",
        }
    }
}

impl fmt::Display for DisjointMergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisjointMergePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client_payload" => Ok(Self::ClientPayload),
            "three_way" => Ok(Self::ThreeWay),
            other => Err(Error::InvalidInput(format!(
                "Unknown disjoint merge policy: {other}"
            ))),
        }
    }
}

/// Tunables of the sync pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Largest accepted push batch
    pub max_batch_size: usize,
    /// Pull page size when the caller gives none
    pub pull_default_limit: usize,
    /// Pull page sizes above this are clamped
    pub pull_max_limit: usize,
    /// Detect-then-write attempts before a change fails as stale
    pub apply_max_attempts: u32,
    pub disjoint_merge: DisjointMergePolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            pull_default_limit: 100,
            pull_max_limit: 1000,
            apply_max_attempts: 3,
            disjoint_merge: DisjointMergePolicy::ClientPayload,
        }
    }
}

/// Sync flows over one storage backend
pub struct Pipeline<'a, S, Q, C, T> {
    store: S,
    queue: Q,
    conflicts: C,
    tx: T,
    registry: &'a Registry,
    settings: SyncSettings,
}

/// Pipeline over a single libSQL connection
pub type LibSqlPipeline<'a> = Pipeline<
    'a,
    LibSqlEntityStore<'a>,
    LibSqlQueueRepository<'a>,
    LibSqlConflictRepository<'a>,
    LibSqlTransactor<'a>,
>;

impl<'a, S, Q, C, T> Pipeline<'a, S, Q, C, T> {
    pub const fn new(
        store: S,
        queue: Q,
        conflicts: C,
        tx: T,
        registry: &'a Registry,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            queue,
            conflicts,
            tx,
            registry,
            settings,
        }
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}

impl<S, Q, C, T: Transactor> Pipeline<'_, S, Q, C, T> {
    /// Close the open transaction: commit on success, roll back on error.
    async fn finish<R>(&self, outcome: Result<R>) -> Result<R> {
        match outcome {
            Ok(value) => {
                if let Err(error) = self.tx.commit().await {
                    self.tx.rollback().await.ok();
                    return Err(error);
                }
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.tx.rollback().await {
                    tracing::error!("Rollback failed: {rollback_error}");
                }
                Err(error)
            }
        }
    }
}

impl<'a> LibSqlPipeline<'a> {
    pub const fn libsql(
        conn: &'a Connection,
        registry: &'a Registry,
        settings: SyncSettings,
    ) -> Self {
        Self::new(
            LibSqlEntityStore::new(conn),
            LibSqlQueueRepository::new(conn),
            LibSqlConflictRepository::new(conn),
            LibSqlTransactor::new(conn),
            registry,
            settings,
        )
    }
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[test]
    fn test_disjoint_merge_policy_parse() {
        assert_eq!(
            "three_way".parse::<DisjointMergePolicy>().unwrap(),
            DisjointMergePolicy::ThreeWay
        );
        assert_eq!(
            " Client_Payload ".parse::<DisjointMergePolicy>().unwrap(),
            DisjointMergePolicy::ClientPayload
        );
        assert!("lww".parse::<DisjointMergePolicy>().is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = SyncSettings::default();
        assert_eq!(settings.pull_default_limit, 100);
        assert_eq!(settings.apply_max_attempts, 3);
        assert_eq!(settings.disjoint_merge, DisjointMergePolicy::ClientPayload);
    }
}
