// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Result records produced by pull, push and combined syncs.

use davsync_caldav::{CalendarEvent, DavError};

/// How a detected conflict should be applied locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Take the server copy (the default).
    UseRemote,
    /// Keep the local copy untouched.
    UseLocal,
    /// Take the server copy and record the conflict for the caller.
    ///
    /// The core never mutates events, so it cannot mint a duplicate UID
    /// itself; duplication is the caller's move when it receives the
    /// recorded conflict.
    KeepBoth,
    /// Record the conflict and change nothing.
    Skip,
}

/// A concurrent edit detected during reconciliation, handed to
/// [`SyncCallback::on_conflict`](crate::SyncCallback::on_conflict).
#[derive(Debug, Clone)]
pub struct EventConflict {
    /// Calendar being synced.
    pub calendar_url: String,
    /// Import id of the affected event.
    pub import_id: String,
    /// Server href of the affected resource.
    pub href: String,
    /// The local copy.
    pub local: CalendarEvent,
    /// The server copy.
    pub remote: CalendarEvent,
}

/// A conflict kept in the final report (KEEP_BOTH and SKIP resolutions).
#[derive(Debug, Clone)]
pub struct RecordedConflict {
    /// Import id of the affected event.
    pub import_id: String,
    /// Server href of the affected resource.
    pub href: String,
    /// The resolution that was applied.
    pub resolution: ConflictResolution,
}

/// Outcome of one pull.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Calendar that was synced.
    pub calendar_url: String,
    /// Whether the delta path (RFC 6578) was used.
    pub incremental: bool,
    /// Whether the ctag short-circuit fired; nothing was fetched.
    pub unchanged: bool,
    /// Import ids delivered to the local store.
    pub upserted: Vec<String>,
    /// Import ids deleted from the local store.
    pub deleted: Vec<String>,
    /// Conflicts recorded for the caller.
    pub conflicts: Vec<RecordedConflict>,
    /// Errors encountered; non-empty means the sync failed.
    pub errors: Vec<DavError>,
}

impl SyncReport {
    /// Whether the sync completed without errors.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of one push loop, accounted per operation kind.
///
/// Push never throws: every outcome lands either in a counter here or in
/// the queue records themselves.
#[derive(Debug, Clone, Default)]
pub struct PushResult {
    /// Creations acknowledged by the server.
    pub created: u32,
    /// Updates acknowledged by the server.
    pub updated: u32,
    /// Deletions acknowledged by the server (404 counts).
    pub deleted: u32,
    /// Operations that failed for non-conflict reasons.
    pub failed: u32,
    /// Event UIDs left in the queue awaiting conflict resolution.
    pub conflicts: Vec<String>,
}

impl PushResult {
    /// Whether every ready operation was pushed cleanly.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed == 0 && self.conflicts.is_empty()
    }
}

/// Push-then-pull outcome for one calendar.
#[derive(Debug, Clone)]
pub struct CombinedSyncResult {
    /// The push half.
    pub push: PushResult,
    /// The pull half.
    pub pull: SyncReport,
}

impl CombinedSyncResult {
    /// Success iff both halves succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.push.success() && self.pull.success()
    }
}
