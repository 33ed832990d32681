// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Enqueue entry points with operation coalescing.

use std::sync::Arc;

use davsync_caldav::{CalendarEvent, DavError, IcalCodec};

use crate::ops::{OperationKind, OperationStatus, PendingOperation};
use crate::store::PendingOperationStore;

/// Front door of the offline queue.
///
/// Coalescing keeps the queue at one operation per event UID and
/// collapses redundant sequences before anything touches the network:
/// a CREATE followed by UPDATEs stays one CREATE with the newest payload,
/// CREATE followed by DELETE cancels out entirely, and UPDATE followed by
/// DELETE becomes the DELETE. UPDATE after DELETE is a caller bug and is
/// rejected immediately.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    store: Arc<dyn PendingOperationStore>,
    codec: Arc<dyn IcalCodec>,
}

impl OperationQueue {
    /// Creates a queue over a store and the payload codec.
    #[must_use]
    pub fn new(store: Arc<dyn PendingOperationStore>, codec: Arc<dyn IcalCodec>) -> Self {
        Self { store, codec }
    }

    /// Queues the creation of a local event on the server.
    ///
    /// # Errors
    ///
    /// [`DavError::Ical`] when the payload cannot be generated;
    /// [`DavError::Logic`] when an UPDATE or DELETE is already queued for
    /// the UID.
    pub fn queue_create(&self, calendar_url: &str, event: &CalendarEvent) -> Result<(), DavError> {
        let ical_data = self.codec.generate(event)?;

        match self.store.get_by_event_uid(&event.uid) {
            None => {
                let mut op = PendingOperation::new(OperationKind::Create, calendar_url, &event.uid);
                op.ical_data = ical_data;
                self.store.enqueue(op)
            }
            Some(existing) if existing.kind == OperationKind::Create => {
                // Re-created before the first push went out; newest payload wins.
                let mut op = existing;
                op.ical_data = ical_data;
                op.status = OperationStatus::Pending;
                self.store.update(&op)
            }
            Some(existing) => Err(DavError::Logic(format!(
                "cannot queue CREATE for {}: {} already pending",
                event.uid, existing.kind
            ))),
        }
    }

    /// Queues an update of an existing server resource.
    ///
    /// # Errors
    ///
    /// [`DavError::Ical`] when the payload cannot be generated;
    /// [`DavError::Logic`] for UPDATE-after-DELETE.
    pub fn queue_update(
        &self,
        event: &CalendarEvent,
        event_url: &str,
        etag: Option<String>,
    ) -> Result<(), DavError> {
        let ical_data = self.codec.generate(event)?;

        match self.store.get_by_event_uid(&event.uid) {
            None => {
                let mut op = PendingOperation::new(OperationKind::Update, "", &event.uid);
                op.calendar_url = calendar_url_of(event_url);
                op.event_url = Some(event_url.to_string());
                op.ical_data = ical_data;
                op.etag = etag;
                self.store.enqueue(op)
            }
            Some(existing) => match existing.kind {
                // The event does not exist on the server yet; fold the new
                // payload into the pending CREATE.
                OperationKind::Create => {
                    let mut op = existing;
                    op.ical_data = ical_data;
                    self.store.update(&op)
                }
                OperationKind::Update => {
                    let mut op = existing;
                    op.event_url = Some(event_url.to_string());
                    op.ical_data = ical_data;
                    op.etag = etag;
                    op.status = OperationStatus::Pending;
                    op.retry_count = 0;
                    op.next_retry_at_ms = 0;
                    op.error_message = None;
                    self.store.update(&op)
                }
                OperationKind::Delete => Err(DavError::Logic(format!(
                    "cannot queue UPDATE for {}: DELETE already pending",
                    event.uid
                ))),
            },
        }
    }

    /// Queues the deletion of a server resource.
    ///
    /// # Errors
    ///
    /// Storage failures from the underlying store.
    pub fn queue_delete(
        &self,
        calendar_url: &str,
        event_uid: &str,
        event_url: Option<String>,
        etag: Option<String>,
    ) -> Result<(), DavError> {
        match self.store.get_by_event_uid(event_uid) {
            None => {
                let mut op = PendingOperation::new(OperationKind::Delete, calendar_url, event_uid);
                op.event_url = event_url;
                op.etag = etag;
                self.store.enqueue(op)
            }
            Some(existing) => match existing.kind {
                // Never pushed; the create and the delete annihilate.
                OperationKind::Create => self.store.remove_by_event_uid(event_uid),
                OperationKind::Update => {
                    let mut op = PendingOperation::new(OperationKind::Delete, calendar_url, event_uid);
                    op.event_url = event_url.or(existing.event_url);
                    op.etag = etag.or(existing.etag);
                    self.store.enqueue(op)
                }
                OperationKind::Delete => Ok(()),
            },
        }
    }
}

/// Derives the calendar collection URL from a resource URL.
fn calendar_url_of(event_url: &str) -> String {
    match event_url.rfind('/') {
        Some(idx) => event_url.get(..=idx).unwrap_or(event_url).to_string(),
        None => event_url.to_string(),
    }
}
