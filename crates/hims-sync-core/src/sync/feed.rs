//! Pull/changes feed
//!
//! Checkpoints are plain timestamps held by the client. Rows that share the
//! modification timestamp of the last entry of a truncated page can be missed
//! by the next pull, since `since` is exclusive.

use std::sync::Arc;

use crate::db::{ConflictRepository, EntityStore, QueueRepository};
use crate::error::{Error, Result};
use crate::models::{FeedEntry, PullRequest, PullResult};
use crate::registry::EntityHandler;
use crate::util::now_ms;

use super::processor::require;
use super::Pipeline;

impl<S, Q, C, T> Pipeline<'_, S, Q, C, T>
where
    S: EntityStore,
    Q: QueueRepository,
    C: ConflictRepository,
{
    /// Server mutations of a facility after `since`, oldest first.
    pub async fn pull(&self, request: &PullRequest) -> Result<PullResult> {
        require(&request.facility_id, "facilityId")?;
        require(&request.client_id, "clientId")?;
        let limit = self.page_size(request.limit)?;
        let handlers = self.requested_handlers(request.entity_types.as_deref())?;
        let server_timestamp = now_ms();

        let mut changes = Vec::new();
        for handler in handlers {
            let schema = handler.schema();
            let records = self
                .store
                .changed_since(schema, &request.facility_id, request.since, limit + 1)
                .await?;
            changes.extend(records.into_iter().map(|record| FeedEntry {
                entity_type: schema.kind.clone(),
                entity_id: record.id.clone(),
                operation: handler.classify_operation(&record, request.since),
                timestamp: record.updated_at,
                payload: record.to_payload(),
            }));
        }

        changes.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.entity_type.cmp(&b.entity_type))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        let has_more = changes.len() > limit;
        changes.truncate(limit);

        tracing::debug!(
            facility = %request.facility_id,
            since = request.since,
            returned = changes.len(),
            has_more,
            "Served pull"
        );
        Ok(PullResult {
            changes,
            server_timestamp,
            has_more,
        })
    }

    fn page_size(&self, requested: Option<usize>) -> Result<usize> {
        match requested {
            None => Ok(self.settings.pull_default_limit.min(self.settings.pull_max_limit)),
            Some(0) => Err(Error::InvalidInput("limit must be at least 1".into())),
            Some(limit) => Ok(limit.min(self.settings.pull_max_limit)),
        }
    }

    /// Handlers for the requested kinds, or every registered kind.
    fn requested_handlers(
        &self,
        kinds: Option<&[String]>,
    ) -> Result<Vec<&Arc<dyn EntityHandler>>> {
        match kinds {
            Some(kinds) if !kinds.is_empty() => {
                let mut handlers = Vec::with_capacity(kinds.len());
                for kind in kinds {
                    let handler = self.registry.resolve(kind)?;
                    let seen = handlers
                        .iter()
                        .any(|existing: &&Arc<dyn EntityHandler>| existing.kind() == handler.kind());
                    if !seen {
                        handlers.push(handler);
                    }
                }
                Ok(handlers)
            }
            _ => self
                .registry
                .kinds()
                .map(|kind| self.registry.resolve(kind))
                .collect(),
        }
    }
}
