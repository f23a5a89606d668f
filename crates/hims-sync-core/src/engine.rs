//! Shared sync engine used by the API server and the CLI.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::Database;
use crate::models::{
    ConflictId, PullRequest, PullResult, PushBatch, PushResult, ResolveRequest, SyncConflict,
    SyncStatusSummary,
};
use crate::registry::{EntitySchema, Registry};
use crate::sync::{LibSqlPipeline, SyncSettings};
use crate::Result;

/// Thread-safe handle over the sync database and entity registry.
#[derive(Clone)]
pub struct SyncEngine {
    db: Arc<Mutex<Database>>,
    registry: Arc<Registry>,
    settings: SyncSettings,
}

impl SyncEngine {
    /// Open an engine over a database file, creating missing entity tables.
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        registry: Registry,
        settings: SyncSettings,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&db_path).await?;
        tracing::info!(path = %db_path.display(), kinds = registry.len(), "Opened sync database");
        Self::from_database(db, registry, settings).await
    }

    /// Open an in-memory engine (primarily for tests).
    pub async fn open_in_memory(registry: Registry, settings: SyncSettings) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Self::from_database(db, registry, settings).await
    }

    async fn from_database(
        db: Database,
        registry: Registry,
        settings: SyncSettings,
    ) -> Result<Self> {
        db.ensure_entity_tables(&registry).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            registry: Arc::new(registry),
            settings,
        })
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Registered entity kinds with their tables and allowed fields.
    pub fn entity_schemas(&self) -> Vec<EntitySchema> {
        self.registry.schemas().cloned().collect()
    }

    /// Push a batch of client changes.
    pub async fn push(&self, batch: &PushBatch, user_id: &str) -> Result<PushResult> {
        let db = self.db.lock().await;
        LibSqlPipeline::libsql(db.connection(), &self.registry, self.settings)
            .push(batch, user_id)
            .await
    }

    /// Pull server changes since a checkpoint.
    pub async fn pull(&self, request: &PullRequest) -> Result<PullResult> {
        let db = self.db.lock().await;
        LibSqlPipeline::libsql(db.connection(), &self.registry, self.settings)
            .pull(request)
            .await
    }

    /// List pending conflicts.
    pub async fn pending_conflicts(
        &self,
        facility_id: &str,
        client_id: Option<&str>,
    ) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        LibSqlPipeline::libsql(db.connection(), &self.registry, self.settings)
            .pending_conflicts(facility_id, client_id)
            .await
    }

    /// Resolve a pending conflict.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &ConflictId,
        request: &ResolveRequest,
        resolver_id: &str,
    ) -> Result<SyncConflict> {
        let db = self.db.lock().await;
        LibSqlPipeline::libsql(db.connection(), &self.registry, self.settings)
            .resolve_conflict(conflict_id, request, resolver_id)
            .await
    }

    /// Queue health for one client.
    pub async fn status(&self, facility_id: &str, client_id: &str) -> Result<SyncStatusSummary> {
        let db = self.db.lock().await;
        LibSqlPipeline::libsql(db.connection(), &self.registry, self.settings)
            .status(facility_id, client_id)
            .await
    }

    /// Reset failed changes to pending.
    pub async fn retry_failed(&self, facility_id: &str, client_id: &str) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlPipeline::libsql(db.connection(), &self.registry, self.settings)
            .retry_failed(facility_id, client_id)
            .await
    }

    /// Reconcile pending changes again.
    pub async fn reprocess_pending(&self, facility_id: &str, client_id: &str) -> Result<PushResult> {
        let db = self.db.lock().await;
        LibSqlPipeline::libsql(db.connection(), &self.registry, self.settings)
            .reprocess_pending(facility_id, client_id)
            .await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
