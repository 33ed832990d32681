// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Collaborator interfaces to the caller's event store.

use davsync_caldav::{CalendarEvent, DavError};

use crate::report::{ConflictResolution, EventConflict, SyncReport};
use crate::state::SyncState;

/// Read-only view of the local event store.
///
/// Implementations must be thread-safe; the engine only reads through
/// this interface and never mutates events.
pub trait LocalEventProvider: Send + Sync {
    /// All local events belonging to a calendar.
    fn local_events(&self, calendar_url: &str) -> Vec<CalendarEvent>;

    /// Looks up one event by import id.
    fn event_by_import_id(&self, import_id: &str) -> Option<CalendarEvent>;

    /// Whether an event with the import id exists locally.
    fn has_event(&self, import_id: &str) -> bool {
        self.event_by_import_id(import_id).is_some()
    }
}

/// Write half of the local store, driven by the engine during apply.
///
/// Errors returned here are trapped: a failing upsert is recorded in the
/// report and the rest of the apply continues.
pub trait SyncResultHandler: Send + Sync {
    /// Creates or replaces the local copy of an event.
    ///
    /// # Errors
    ///
    /// Storage failures; trapped by the engine.
    fn upsert_event(
        &self,
        event: &CalendarEvent,
        url: &str,
        etag: Option<&str>,
    ) -> Result<(), DavError>;

    /// Removes the local copy of an event.
    ///
    /// # Errors
    ///
    /// Storage failures; trapped by the engine.
    fn delete_event(&self, import_id: &str) -> Result<(), DavError>;

    /// Persists the new sync state snapshot.
    ///
    /// # Errors
    ///
    /// Storage failures; trapped by the engine.
    fn save_sync_state(&self, state: &SyncState) -> Result<(), DavError>;
}

/// Optional progress/conflict hooks, called from the syncing thread.
pub trait SyncCallback: Send + Sync {
    /// A sync started for the calendar.
    fn on_sync_started(&self, _calendar_url: &str) {}

    /// Best-effort progress; `current` never decreases within a phase.
    fn on_progress(&self, _message: &str, _current: u32, _total: u32) {}

    /// Asks the caller to resolve a concurrent edit.
    fn on_conflict(&self, _conflict: &EventConflict) -> ConflictResolution {
        ConflictResolution::UseRemote
    }

    /// A sync finished; the report says how it went.
    fn on_sync_complete(&self, _report: &SyncReport) {}

    /// A sync aborted with a terminal error.
    fn on_sync_error(&self, _error: &DavError) {}
}
