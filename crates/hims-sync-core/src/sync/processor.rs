//! Sync queue processor

use crate::db::{ConflictRepository, EntityStore, QueueRepository, Transactor, VersionGuard};
use crate::error::{Error, Result};
use crate::models::{
    ChangeResult, ChangeStatus, ConflictId, Operation, PushBatch, PushResult, QueuedChange,
    SyncConflict, SyncStatusSummary,
};
use crate::util::{compact_text, now_ms};

use super::applier::{apply, ApplyOutcome, ApplyRequest};
use super::detector::{evaluate, Detection};
use super::merge::client_delta;
use super::{DisjointMergePolicy, Pipeline};

enum Reconciled {
    Synced,
    Conflict(Box<SyncConflict>),
}

pub(super) fn require(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{name} is required")));
    }
    Ok(())
}

impl<S, Q, C, T> Pipeline<'_, S, Q, C, T>
where
    S: EntityStore,
    Q: QueueRepository,
    C: ConflictRepository,
    T: Transactor,
{
    /// Queue and reconcile every change of a batch.
    ///
    /// Only a structurally invalid batch is rejected; each change otherwise
    /// gets its own outcome and no change can abort the others.
    pub async fn push(&self, batch: &PushBatch, user_id: &str) -> Result<PushResult> {
        batch.validate(self.settings.max_batch_size)?;

        let mut result = PushResult::default();
        for change in &batch.changes {
            let entry = QueuedChange::intake(batch, change, user_id, now_ms());
            if let Err(error) = self.queue.insert(&entry).await {
                tracing::error!(
                    facility = %entry.facility_id,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    "Failed to queue change: {error}"
                );
                result.record(ChangeResult::failed(
                    &entry.entity_id,
                    compact_text(&error.to_string()),
                ));
                continue;
            }
            result.record(self.process_entry(&entry).await);
        }

        tracing::info!(
            facility = %batch.facility_id,
            synced = result.synced,
            conflicts = result.conflicts,
            failed = result.failed,
            "Processed push batch"
        );
        Ok(result)
    }

    /// Run a client's `pending` queue entries back through reconciliation.
    pub async fn reprocess_pending(&self, facility_id: &str, client_id: &str) -> Result<PushResult> {
        require(facility_id, "facilityId")?;
        require(client_id, "clientId")?;

        let mut result = PushResult::default();
        for entry in self.queue.list_pending(facility_id, client_id).await? {
            if !self.queue.claim_pending(&entry.id).await? {
                continue;
            }
            result.record(self.process_entry(&entry).await);
        }

        tracing::info!(
            facility = %facility_id,
            synced = result.synced,
            conflicts = result.conflicts,
            failed = result.failed,
            "Reprocessed pending changes"
        );
        Ok(result)
    }

    /// Queue health for one client.
    pub async fn status(&self, facility_id: &str, client_id: &str) -> Result<SyncStatusSummary> {
        require(facility_id, "facilityId")?;
        require(client_id, "clientId")?;

        Ok(SyncStatusSummary {
            pending_count: self
                .queue
                .count_by_status(facility_id, client_id, ChangeStatus::Pending)
                .await?,
            conflict_count: self.conflicts.count_pending(facility_id, client_id).await?,
            failed_count: self
                .queue
                .count_by_status(facility_id, client_id, ChangeStatus::Failed)
                .await?,
            last_sync_at: self.queue.last_synced_at(facility_id, client_id).await?,
        })
    }

    /// Reset a client's failed changes to `pending`. Nothing is reprocessed.
    pub async fn retry_failed(&self, facility_id: &str, client_id: &str) -> Result<u64> {
        require(facility_id, "facilityId")?;
        require(client_id, "clientId")?;

        let count = self.queue.reset_failed(facility_id, client_id).await?;
        tracing::info!(facility = %facility_id, count, "Reset failed changes to pending");
        Ok(count)
    }

    /// Settle one queue entry in `processing` into a terminal status.
    async fn process_entry(&self, entry: &QueuedChange) -> ChangeResult {
        let outcome = match self.reconcile(entry).await {
            Ok(Reconciled::Synced) => {
                if let Err(error) = self.queue.mark_synced(&entry.id, now_ms()).await {
                    tracing::error!(
                        change_id = %entry.id,
                        entity_id = %entry.entity_id,
                        "Change applied but queue entry not updated: {error}"
                    );
                }
                return ChangeResult::synced(&entry.entity_id);
            }
            Ok(Reconciled::Conflict(conflict)) => self.record_conflict(entry, &conflict).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(conflict_id) => {
                tracing::info!(
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    conflict_id = %conflict_id,
                    "Change conflicts with server state"
                );
                ChangeResult::conflict(&entry.entity_id, conflict_id)
            }
            Err(error) => {
                let message = compact_text(&error.to_string());
                tracing::warn!(
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    "Change failed: {message}"
                );
                if let Err(mark_error) = self.queue.mark_failed(&entry.id, &message).await {
                    tracing::error!(change_id = %entry.id, "Failed to record failure: {mark_error}");
                }
                ChangeResult::failed(&entry.entity_id, message)
            }
        }
    }

    /// Log the conflict and park the queue entry on it, both or neither.
    async fn record_conflict(
        &self,
        entry: &QueuedChange,
        conflict: &SyncConflict,
    ) -> Result<ConflictId> {
        self.tx.begin().await?;
        let linked = self.link_conflict(entry, conflict).await;
        self.finish(linked).await
    }

    async fn link_conflict(
        &self,
        entry: &QueuedChange,
        conflict: &SyncConflict,
    ) -> Result<ConflictId> {
        self.conflicts.insert(conflict).await?;
        self.queue.mark_conflict(&entry.id, &conflict.id).await?;
        Ok(conflict.id)
    }

    /// Detect, then write under the observed version, re-detecting when the row moves.
    async fn reconcile(&self, entry: &QueuedChange) -> Result<Reconciled> {
        require(&entry.entity_id, "entityId")?;
        let schema = self.registry.resolve(&entry.entity_type)?.schema();

        if entry.operation == Operation::Create {
            apply(
                &self.store,
                schema,
                ApplyRequest {
                    facility_id: &entry.facility_id,
                    entity_id: &entry.entity_id,
                    operation: Operation::Create,
                    payload: &entry.payload,
                    guard: VersionGuard::Any,
                    restore: false,
                    now: now_ms(),
                },
            )
            .await?;
            return Ok(Reconciled::Synced);
        }

        let attempts = self.settings.apply_max_attempts.max(1);
        for attempt in 1..=attempts {
            let now = now_ms();
            let record = self.store.fetch(schema, &entry.entity_id).await?;

            let observed_version = match evaluate(entry, record.as_ref(), now) {
                Detection::Conflict(draft) => {
                    return Ok(Reconciled::Conflict(Box::new(draft.into_conflict(entry, now))));
                }
                Detection::Clear { observed_version } => observed_version,
            };

            let delta;
            let payload = match self.settings.disjoint_merge {
                DisjointMergePolicy::ThreeWay if record.is_some() => {
                    delta = client_delta(&entry.payload, entry.previous_payload.as_ref());
                    &delta
                }
                _ => &entry.payload,
            };

            let outcome = apply(
                &self.store,
                schema,
                ApplyRequest {
                    facility_id: &entry.facility_id,
                    entity_id: &entry.entity_id,
                    operation: entry.operation,
                    payload,
                    guard: observed_version.map_or(VersionGuard::Any, VersionGuard::Exactly),
                    restore: false,
                    now,
                },
            )
            .await?;

            match (entry.operation, outcome) {
                (_, ApplyOutcome::Applied)
                | (Operation::Delete, ApplyOutcome::Missing | ApplyOutcome::AlreadyDeleted) => {
                    return Ok(Reconciled::Synced);
                }
                _ => tracing::debug!(
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    attempt,
                    "Row changed during apply, detecting again"
                ),
            }
        }

        Err(Error::StaleWrite {
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            attempts,
        })
    }
}
