// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Resolution of pushed operations that hit a precondition failure.

use std::sync::Arc;

use davsync_caldav::{CalDavClient, CalendarEvent, DavError, FetchedResource};

use crate::local::SyncResultHandler;
use crate::ops::{OperationKind, OperationStatus, PendingOperation};
use crate::store::PendingOperationStore;

/// How to resolve a conflicted pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Take the server copy, drop the local change.
    ServerWins,
    /// Force the local change through; DELETE only.
    LocalWins,
    /// Compare RFC 5545 `(SEQUENCE, DTSTAMP)` and let the newer revision
    /// win.
    NewestWins,
    /// Park the operation for a human.
    Manual,
}

/// What a resolution did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// Server copy was delivered to the local store; operation dropped.
    ServerApplied,
    /// Server had deleted the resource; local copy removed, operation
    /// dropped.
    LocalDeleted,
    /// Operation reset to PENDING with its `ETag` cleared; the next push
    /// overwrites the server.
    LocalQueued,
    /// Forced DELETE went through; operation dropped.
    RemoteDeleted,
    /// Operation parked as FAILED awaiting manual resolution.
    ManualRequired,
}

/// Applies a [`ConflictStrategy`] to a conflicted operation.
#[derive(Clone)]
pub struct ConflictResolver {
    client: Arc<CalDavClient>,
    store: Arc<dyn PendingOperationStore>,
    handler: Arc<dyn SyncResultHandler>,
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("client", &self.client)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ConflictResolver {
    /// Creates a resolver over the client, queue store and local-store
    /// handler.
    #[must_use]
    pub fn new(
        client: Arc<CalDavClient>,
        store: Arc<dyn PendingOperationStore>,
        handler: Arc<dyn SyncResultHandler>,
    ) -> Self {
        Self {
            client,
            store,
            handler,
        }
    }

    /// Resolves one operation under the given strategy.
    ///
    /// # Errors
    ///
    /// [`DavError::Logic`] for unsupported strategy/kind combinations;
    /// transport errors from the at-most-one server fetch.
    pub async fn resolve(
        &self,
        op: &PendingOperation,
        strategy: ConflictStrategy,
    ) -> Result<ConflictOutcome, DavError> {
        match strategy {
            ConflictStrategy::ServerWins => self.server_wins(op).await,
            ConflictStrategy::LocalWins => self.local_wins(op).await,
            ConflictStrategy::NewestWins => self.newest_wins(op).await,
            ConflictStrategy::Manual => {
                self.store
                    .mark_failed(&op.id, "Conflict: manual resolution required")?;
                Ok(ConflictOutcome::ManualRequired)
            }
        }
    }

    async fn server_wins(&self, op: &PendingOperation) -> Result<ConflictOutcome, DavError> {
        let url = resource_url(op);
        match self.client.get_event(&url).await? {
            Some(fetched) => {
                self.apply_server_copy(&url, &fetched)?;
                self.store.remove(&op.id)?;
                Ok(ConflictOutcome::ServerApplied)
            }
            None => {
                self.handler.delete_event(&op.event_uid)?;
                self.store.remove(&op.id)?;
                Ok(ConflictOutcome::LocalDeleted)
            }
        }
    }

    async fn local_wins(&self, op: &PendingOperation) -> Result<ConflictOutcome, DavError> {
        if op.kind != OperationKind::Delete {
            return Err(DavError::Logic(
                "LOCAL_WINS supports DELETE only; use NEWEST_WINS or SERVER_WINS".to_string(),
            ));
        }
        // Force delete: no If-Match, and 404 is already success.
        self.client.delete_event(&resource_url(op), None).await?;
        self.store.remove(&op.id)?;
        Ok(ConflictOutcome::RemoteDeleted)
    }

    async fn newest_wins(&self, op: &PendingOperation) -> Result<ConflictOutcome, DavError> {
        if op.kind == OperationKind::Delete {
            return Err(DavError::Logic(
                "NEWEST_WINS needs a local payload; use LOCAL_WINS or SERVER_WINS for deletes"
                    .to_string(),
            ));
        }

        let local = self.local_revision(op)?;
        let url = resource_url(op);

        // Exactly one fetch; both branches below reuse it.
        let fetched = self.client.get_event(&url).await?;
        let server = fetched
            .as_ref()
            .and_then(|f| master_event(&f.events, &op.event_uid));

        let server_is_newer = server
            .is_some_and(|s| s.revision_key() > local.revision_key());

        if server_is_newer {
            let fetched = fetched.ok_or_else(|| {
                DavError::Logic("server revision vanished mid-resolution".to_string())
            })?;
            self.apply_server_copy(&url, &fetched)?;
            self.store.remove(&op.id)?;
            Ok(ConflictOutcome::ServerApplied)
        } else {
            // Local is at least as new: requeue without the ETag so the
            // next push overwrites whatever the server has.
            let mut reset = op.clone();
            reset.status = OperationStatus::Pending;
            reset.retry_count = 0;
            reset.next_retry_at_ms = 0;
            reset.etag = None;
            reset.error_message = None;
            self.store.update(&reset)?;
            Ok(ConflictOutcome::LocalQueued)
        }
    }

    fn apply_server_copy(&self, url: &str, fetched: &FetchedResource) -> Result<(), DavError> {
        let etag = fetched.etag.as_ref().map(|e| e.as_str());
        for event in &fetched.events {
            self.handler.upsert_event(event, url, etag)?;
        }
        Ok(())
    }

    fn local_revision(&self, op: &PendingOperation) -> Result<CalendarEvent, DavError> {
        let parsed = self.client.codec().parse(&op.ical_data)?;
        master_event(&parsed.events, &op.event_uid)
            .cloned()
            .ok_or_else(|| {
                DavError::Ical(format!(
                    "queued payload for {} has no master event",
                    op.event_uid
                ))
            })
    }
}

/// The master (non-override) event for a UID, falling back to the first
/// event in the payload.
fn master_event<'a>(events: &'a [CalendarEvent], uid: &str) -> Option<&'a CalendarEvent> {
    events
        .iter()
        .find(|e| e.uid == uid && e.recurrence_id.is_none())
        .or_else(|| events.first())
}

/// The server URL an operation targets; CREATEs mint it from the UID.
fn resource_url(op: &PendingOperation) -> String {
    op.event_url.clone().unwrap_or_else(|| {
        format!(
            "{}/{}.ics",
            op.calendar_url.trim_end_matches('/'),
            op.event_uid
        )
    })
}
