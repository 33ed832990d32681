// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Queue storage for pending operations.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use davsync_caldav::DavError;

use crate::ops::{OperationStatus, PendingOperation};
use crate::push::MAX_RETRIES;

/// Durable store for queued operations.
///
/// Implementations must be internally synchronized; all mutations are
/// linearizable. The store owns its records exclusively and guarantees at
/// most one operation per `event_uid`.
pub trait PendingOperationStore: Send + Sync + std::fmt::Debug {
    /// Inserts a record, replacing any existing record for the same
    /// `event_uid`.
    ///
    /// # Errors
    ///
    /// Implementations may fail on storage errors.
    fn enqueue(&self, op: PendingOperation) -> Result<(), DavError>;

    /// Replaces the record with the given id.
    ///
    /// # Errors
    ///
    /// Fails with [`DavError::Logic`] when no such record exists.
    fn update(&self, op: &PendingOperation) -> Result<(), DavError>;

    /// Removes a record by id. Removing a missing record is a no-op.
    ///
    /// # Errors
    ///
    /// Implementations may fail on storage errors.
    fn remove(&self, id: &str) -> Result<(), DavError>;

    /// Removes the record for an event UID, if any.
    ///
    /// # Errors
    ///
    /// Implementations may fail on storage errors.
    fn remove_by_event_uid(&self, event_uid: &str) -> Result<(), DavError>;

    /// Looks up the record for an event UID.
    fn get_by_event_uid(&self, event_uid: &str) -> Option<PendingOperation>;

    /// Operations eligible to run at `now_ms`: PENDING records whose
    /// `next_retry_at` has passed, plus FAILED records that still have
    /// retries left.
    fn ready_operations(&self, now_ms: i64) -> Vec<PendingOperation>;

    /// Claims a record for a running push.
    ///
    /// # Errors
    ///
    /// Fails with [`DavError::Logic`] when no such record exists.
    fn mark_in_progress(&self, id: &str) -> Result<(), DavError>;

    /// Records a failure message on a record and parks it as FAILED.
    ///
    /// # Errors
    ///
    /// Fails with [`DavError::Logic`] when no such record exists.
    fn mark_failed(&self, id: &str, message: &str) -> Result<(), DavError>;

    /// Every record in the queue, for inspection.
    fn all(&self) -> Vec<PendingOperation>;
}

/// In-memory, mutex-guarded store keyed by `event_uid`.
#[derive(Debug, Default)]
pub struct MemoryOperationStore {
    inner: Mutex<HashMap<String, PendingOperation>>,
}

impl MemoryOperationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingOperation>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_record<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut PendingOperation) -> T,
    ) -> Result<T, DavError> {
        let mut records = self.locked();
        records
            .values_mut()
            .find(|op| op.id == id)
            .map(f)
            .ok_or_else(|| DavError::Logic(format!("no pending operation with id {id}")))
    }
}

impl PendingOperationStore for MemoryOperationStore {
    fn enqueue(&self, op: PendingOperation) -> Result<(), DavError> {
        self.locked().insert(op.event_uid.clone(), op);
        Ok(())
    }

    fn update(&self, op: &PendingOperation) -> Result<(), DavError> {
        let mut records = self.locked();
        let found = records.values().any(|existing| existing.id == op.id);
        if !found {
            return Err(DavError::Logic(format!(
                "no pending operation with id {}",
                op.id
            )));
        }
        records.insert(op.event_uid.clone(), op.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<(), DavError> {
        self.locked().retain(|_, op| op.id != id);
        Ok(())
    }

    fn remove_by_event_uid(&self, event_uid: &str) -> Result<(), DavError> {
        self.locked().remove(event_uid);
        Ok(())
    }

    fn get_by_event_uid(&self, event_uid: &str) -> Option<PendingOperation> {
        self.locked().get(event_uid).cloned()
    }

    fn ready_operations(&self, now_ms: i64) -> Vec<PendingOperation> {
        let records = self.locked();
        let mut ready: Vec<PendingOperation> = records
            .values()
            .filter(|op| match op.status {
                OperationStatus::Pending => op.next_retry_at_ms <= now_ms,
                OperationStatus::Failed => {
                    op.retry_count < MAX_RETRIES && op.next_retry_at_ms <= now_ms
                }
                OperationStatus::InProgress => false,
            })
            .cloned()
            .collect();
        ready.sort_by_key(|op| op.created_at_ms);
        ready
    }

    fn mark_in_progress(&self, id: &str) -> Result<(), DavError> {
        self.with_record(id, |op| op.status = OperationStatus::InProgress)
    }

    fn mark_failed(&self, id: &str, message: &str) -> Result<(), DavError> {
        self.with_record(id, |op| {
            op.status = OperationStatus::Failed;
            op.error_message = Some(message.to_string());
        })
    }

    fn all(&self) -> Vec<PendingOperation> {
        let mut all: Vec<PendingOperation> = self.locked().values().cloned().collect();
        all.sort_by_key(|op| op.created_at_ms);
        all
    }
}
