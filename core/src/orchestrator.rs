// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Push-then-pull composition per calendar.

use crate::engine::SyncEngine;
use crate::push::PushEngine;
use crate::report::CombinedSyncResult;
use crate::state::SyncState;

/// Composes a push and a pull into one sync.
///
/// Push always runs first: local changes must reach the server before the
/// pull, or fresh server data would clobber edits still sitting in the
/// queue. Callers serialize syncs per calendar; different calendars may
/// sync concurrently.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    push: PushEngine,
    engine: SyncEngine,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over a push engine and a pull engine.
    #[must_use]
    pub fn new(push: PushEngine, engine: SyncEngine) -> Self {
        Self { push, engine }
    }

    /// Pushes queued mutations for the calendar, then pulls, preferring
    /// the incremental path when the previous state carries a token.
    pub async fn sync(&self, calendar_url: &str, previous: &SyncState) -> CombinedSyncResult {
        let push = self.push.push_for_calendar(calendar_url).await;
        let pull = self.engine.sync_incremental(calendar_url, previous, false).await;
        CombinedSyncResult { push, pull }
    }

    /// Push-then-pull with a forced full pull.
    pub async fn sync_full(&self, calendar_url: &str, previous: &SyncState) -> CombinedSyncResult {
        let push = self.push.push_for_calendar(calendar_url).await;
        let pull = self.engine.sync_incremental(calendar_url, previous, true).await;
        CombinedSyncResult { push, pull }
    }
}
