// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Per-calendar synchronization state.

use std::collections::HashMap;

/// Snapshot of what the engine knew about a calendar after its last
/// successful sync.
///
/// The state is owned by the caller: the engine reads the snapshot it is
/// handed and emits a fresh one through
/// [`SyncResultHandler::save_sync_state`](crate::SyncResultHandler::save_sync_state)
/// at the end of a successful sync. `etags` and `url_map` may drift apart
/// (a crash between apply and save, a server rewriting hrefs); the engine
/// tolerates the inconsistency and repairs it on the next full sync.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncState {
    /// Absolute URL of the calendar this state belongs to.
    pub calendar_url: String,
    /// Collection tag at the time of the last sync.
    pub ctag: Option<String>,
    /// RFC 6578 sync token for the next incremental sync.
    pub sync_token: Option<String>,
    /// href → unquoted `ETag` for every resource seen on the server.
    pub etags: HashMap<String, String>,
    /// import id → href, used to translate delta deletions.
    pub url_map: HashMap<String, String>,
    /// Completion time of the last sync, epoch milliseconds.
    pub last_sync_ms: i64,
}

impl SyncState {
    /// Fresh state for a calendar that has never been synced.
    #[must_use]
    pub fn empty(calendar_url: impl Into<String>) -> Self {
        Self {
            calendar_url: calendar_url.into(),
            ..Self::default()
        }
    }
}
