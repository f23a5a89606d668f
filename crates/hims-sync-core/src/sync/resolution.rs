//! Conflict resolution workflow

use crate::db::{
    ConflictRepository, EntityStore, QueueRepository, ResolutionRecord, Transactor, VersionGuard,
};
use crate::error::{Error, Result};
use crate::models::{
    ConflictId, ConflictType, Operation, Payload, Resolution, ResolveRequest, SyncConflict,
};
use crate::registry::EntitySchema;
use crate::util::{normalize_text_option, now_ms};

use super::applier::{apply, ApplyOutcome, ApplyRequest};
use super::processor::require;
use super::Pipeline;

/// Write a resolution performs against the entity table
enum ResolutionWrite<'p> {
    None,
    Update { payload: &'p Payload, restore: bool },
    Delete,
}

fn plan<'p>(
    conflict: &'p SyncConflict,
    request: &'p ResolveRequest,
) -> Result<ResolutionWrite<'p>> {
    let restore = conflict.conflict_type == ConflictType::DeleteEdit;
    Ok(match request.resolution {
        Resolution::Pending => {
            return Err(Error::InvalidInput("resolution must not be pending".into()));
        }
        Resolution::ServerWins => ResolutionWrite::None,
        Resolution::ClientWins if conflict.conflict_type == ConflictType::EditDelete => {
            ResolutionWrite::Delete
        }
        Resolution::ClientWins => ResolutionWrite::Update {
            payload: &conflict.client_payload,
            restore,
        },
        Resolution::Merged | Resolution::Manual => ResolutionWrite::Update {
            payload: request
                .resolved_payload
                .as_ref()
                .ok_or(Error::ResolvedPayloadRequired(request.resolution.as_str()))?,
            restore,
        },
    })
}

impl<S, Q, C, T> Pipeline<'_, S, Q, C, T>
where
    S: EntityStore,
    Q: QueueRepository,
    C: ConflictRepository,
    T: Transactor,
{
    /// Pending conflicts of a facility, optionally narrowed to one client.
    pub async fn pending_conflicts(
        &self,
        facility_id: &str,
        client_id: Option<&str>,
    ) -> Result<Vec<SyncConflict>> {
        require(facility_id, "facilityId")?;
        let client_id = client_id.map(str::trim).filter(|id| !id.is_empty());
        self.conflicts.list_pending(facility_id, client_id).await
    }

    /// Apply a decision to a pending conflict.
    ///
    /// Claiming the conflict, writing the entity and settling the linked
    /// queue entries run in one transaction. A second resolve fails with
    /// `ConflictAlreadyResolved`; any failed step leaves the conflict pending.
    /// Resolution writes carry no version guard.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &ConflictId,
        request: &ResolveRequest,
        resolver_id: &str,
    ) -> Result<SyncConflict> {
        request.validate()?;
        require(resolver_id, "resolver")?;

        let conflict = self
            .conflicts
            .get(conflict_id)
            .await?
            .ok_or_else(|| Error::ConflictNotFound(conflict_id.to_string()))?;
        if !conflict.is_pending() {
            return Err(Error::ConflictAlreadyResolved(conflict_id.to_string()));
        }

        let schema = self.registry.resolve(&conflict.entity_type)?.schema();
        let write = plan(&conflict, request)?;
        if let ResolutionWrite::Update { payload, .. } = &write {
            schema.columns_for(payload)?;
        }

        let notes = normalize_text_option(request.notes.clone());
        let record = ResolutionRecord {
            resolution: request.resolution,
            resolved_payload: request
                .resolved_payload
                .as_ref()
                .filter(|_| request.resolution.requires_payload()),
            resolved_by: resolver_id,
            notes: notes.as_deref(),
            resolved_at: now_ms(),
        };

        self.tx.begin().await?;
        let committed = self.commit_resolution(&conflict, schema, &write, record).await;
        let settled = self.finish(committed).await.inspect_err(|error| {
            tracing::warn!(
                conflict_id = %conflict_id,
                entity_type = %conflict.entity_type,
                entity_id = %conflict.entity_id,
                "Resolution rolled back, conflict left pending: {error}"
            );
        })?;
        tracing::info!(
            conflict_id = %conflict_id,
            resolution = %request.resolution,
            settled,
            "Resolved conflict"
        );

        self.conflicts
            .get(conflict_id)
            .await?
            .ok_or_else(|| Error::ConflictNotFound(conflict_id.to_string()))
    }

    /// Claim, write and settle; returns the number of queue entries settled.
    async fn commit_resolution(
        &self,
        conflict: &SyncConflict,
        schema: &EntitySchema,
        write: &ResolutionWrite<'_>,
        record: ResolutionRecord<'_>,
    ) -> Result<u64> {
        let now = record.resolved_at;
        if !self.conflicts.claim(&conflict.id, record).await? {
            return Err(Error::ConflictAlreadyResolved(conflict.id.to_string()));
        }
        self.write_resolution(conflict, schema, write, now).await?;
        self.queue.mark_synced_for_conflict(&conflict.id, now).await
    }

    async fn write_resolution(
        &self,
        conflict: &SyncConflict,
        schema: &EntitySchema,
        write: &ResolutionWrite<'_>,
        now: i64,
    ) -> Result<()> {
        let empty = Payload::new();
        let (operation, payload, restore) = match write {
            ResolutionWrite::None => return Ok(()),
            ResolutionWrite::Delete => (Operation::Delete, &empty, false),
            ResolutionWrite::Update { payload, restore } => (Operation::Update, *payload, *restore),
        };

        let outcome = apply(
            &self.store,
            schema,
            ApplyRequest {
                facility_id: &conflict.facility_id,
                entity_id: &conflict.entity_id,
                operation,
                payload,
                guard: VersionGuard::Any,
                restore,
                now,
            },
        )
        .await?;

        match (operation, outcome) {
            (_, ApplyOutcome::Applied)
            | (Operation::Delete, ApplyOutcome::Missing | ApplyOutcome::AlreadyDeleted) => Ok(()),
            (_, ApplyOutcome::Missing | ApplyOutcome::AlreadyDeleted) => Err(Error::NotFound(
                format!("{} {}", conflict.entity_type, conflict.entity_id),
            )),
            (_, ApplyOutcome::VersionChanged) => Err(Error::Database(format!(
                "Unguarded write to {} {} affected no rows",
                conflict.entity_type, conflict.entity_id
            ))),
        }
    }
}
