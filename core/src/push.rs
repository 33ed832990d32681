// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The push loop: drains ready operations against the server.

use std::sync::Arc;

use davsync_caldav::{CalDavClient, DavError, ETag};

use crate::ops::{OperationKind, OperationStatus, PendingOperation, now_ms};
use crate::report::PushResult;
use crate::store::PendingOperationStore;

/// Retries an operation may consume before it is flagged permanent.
pub const MAX_RETRIES: u32 = 5;

/// First queue-level retry delay.
const INITIAL_BACKOFF_MS: i64 = 60_000;

/// Queue-level retry delay cap.
const MAX_BACKOFF_MS: i64 = 3_600_000;

/// Pushes queued mutations to the server.
///
/// All outcomes land in the queue records and the returned
/// [`PushResult`]; the local event store is never touched from here.
/// Progress is made only when the caller invokes a push — retry timing
/// is data (`next_retry_at`), not a background thread.
#[derive(Debug, Clone)]
pub struct PushEngine {
    client: Arc<CalDavClient>,
    store: Arc<dyn PendingOperationStore>,
}

impl PushEngine {
    /// Creates a push engine over a client and the operation store.
    #[must_use]
    pub fn new(client: Arc<CalDavClient>, store: Arc<dyn PendingOperationStore>) -> Self {
        Self { client, store }
    }

    /// Pushes every ready operation.
    pub async fn push_all(&self) -> PushResult {
        self.push_ready(None).await
    }

    /// Pushes ready operations whose calendar URL starts with the given
    /// prefix.
    pub async fn push_for_calendar(&self, calendar_url: &str) -> PushResult {
        self.push_ready(Some(calendar_url)).await
    }

    async fn push_ready(&self, calendar_prefix: Option<&str>) -> PushResult {
        let now = now_ms();
        let mut result = PushResult::default();

        for op in self.store.ready_operations(now) {
            if let Some(prefix) = calendar_prefix {
                if !op.calendar_url.starts_with(prefix) {
                    continue;
                }
            }
            if let Err(e) = self.store.mark_in_progress(&op.id) {
                tracing::warn!(id = %op.id, error = %e, "skipping unclaimable operation");
                continue;
            }

            let outcome = self.perform(&op).await;
            self.settle(&op, outcome, now, &mut result);
        }

        result
    }

    async fn perform(&self, op: &PendingOperation) -> Result<(), DavError> {
        let etag = op.etag.as_deref().map(|e| ETag::new(e.to_string()));
        match op.kind {
            OperationKind::Create => self
                .client
                .create_event_raw(&op.calendar_url, &op.event_uid, op.ical_data.clone())
                .await
                .map(|_| ()),
            OperationKind::Update => {
                let url = op.event_url.as_deref().ok_or_else(|| {
                    DavError::Logic(format!("UPDATE for {} has no event URL", op.event_uid))
                })?;
                self.client
                    .update_event_raw(url, op.ical_data.clone(), etag.as_ref())
                    .await
                    .map(|_| ())
            }
            OperationKind::Delete => {
                let url = op.event_url.as_deref().ok_or_else(|| {
                    DavError::Logic(format!("DELETE for {} has no event URL", op.event_uid))
                })?;
                self.client.delete_event(url, etag.as_ref()).await
            }
        }
    }

    fn settle(
        &self,
        op: &PendingOperation,
        outcome: Result<(), DavError>,
        now: i64,
        result: &mut PushResult,
    ) {
        match outcome {
            Ok(()) => {
                if let Err(e) = self.store.remove(&op.id) {
                    tracing::warn!(id = %op.id, error = %e, "pushed but could not dequeue");
                }
                match op.kind {
                    OperationKind::Create => result.created += 1,
                    OperationKind::Update => result.updated += 1,
                    OperationKind::Delete => result.deleted += 1,
                }
            }
            Err(DavError::Conflict(detail)) => {
                self.park_conflict(op, &detail, result);
            }
            Err(DavError::Http { code: 404, .. }) if op.kind == OperationKind::Update => {
                self.park_conflict(op, "event no longer exists", result);
            }
            Err(e) if is_retryable(&e) && op.retry_count < MAX_RETRIES => {
                let retry_count = op.retry_count + 1;
                let mut failed = op.clone();
                failed.status = OperationStatus::Failed;
                failed.retry_count = retry_count;
                failed.next_retry_at_ms = now + backoff_ms(retry_count);
                failed.error_message = Some(e.to_string());
                if let Err(store_err) = self.store.update(&failed) {
                    tracing::warn!(id = %op.id, error = %store_err, "could not reschedule");
                }
                tracing::debug!(uid = %op.event_uid, retry_count, "rescheduled after {e}");
                result.failed += 1;
            }
            Err(e) => {
                let mut failed = op.clone();
                failed.status = OperationStatus::Failed;
                // Flagged permanent: no retries remain.
                failed.retry_count = MAX_RETRIES;
                failed.error_message = Some(format!("Permanent failure: {e}"));
                if let Err(store_err) = self.store.update(&failed) {
                    tracing::warn!(id = %op.id, error = %store_err, "could not park operation");
                }
                tracing::warn!(uid = %op.event_uid, "permanent failure: {e}");
                result.failed += 1;
            }
        }
    }

    /// Conflicts stay in the queue without consuming a retry; they are
    /// only cleared through explicit resolution.
    fn park_conflict(&self, op: &PendingOperation, detail: &str, result: &mut PushResult) {
        if let Err(e) = self.store.mark_failed(&op.id, &format!("Conflict: {detail}")) {
            tracing::warn!(id = %op.id, error = %e, "could not park conflict");
        }
        result.conflicts.push(op.event_uid.clone());
    }
}

/// Whether a failure is worth another attempt: transient transport
/// trouble, throttling, or a server-side error.
fn is_retryable(error: &DavError) -> bool {
    match error {
        DavError::Network(_) => true,
        DavError::Http { code, .. } => *code >= 500 || *code == 429,
        _ => false,
    }
}

/// `min(max(initial * 2^retry_count, initial), max)`.
fn backoff_ms(retry_count: u32) -> i64 {
    let scaled = INITIAL_BACKOFF_MS.saturating_mul(1_i64 << retry_count.min(10));
    scaled.clamp(INITIAL_BACKOFF_MS, MAX_BACKOFF_MS)
}
