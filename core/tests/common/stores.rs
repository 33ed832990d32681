// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory collaborator implementations that record what the engine
//! did to them.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use davsync_caldav::{CalendarEvent, DavError};
use davsync_core::{
    ConflictResolution, EventConflict, LocalEventProvider, SyncCallback, SyncReport,
    SyncResultHandler, SyncState,
};

/// Thread-safe in-memory event store for the read side.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    events: Mutex<HashMap<String, CalendarEvent>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        let provider = Self::new();
        for event in events {
            provider.insert(event);
        }
        provider
    }

    pub fn insert(&self, event: CalendarEvent) {
        self.events
            .lock()
            .unwrap()
            .insert(event.import_id(), event);
    }
}

impl LocalEventProvider for MemoryProvider {
    fn local_events(&self, _calendar_url: &str) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().values().cloned().collect()
    }

    fn event_by_import_id(&self, import_id: &str) -> Option<CalendarEvent> {
        self.events.lock().unwrap().get(import_id).cloned()
    }
}

/// Write-side handler that records every call; upserts can be made to
/// fail for chosen import ids.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub upserts: Mutex<Vec<(String, String, Option<String>)>>,
    pub deletes: Mutex<Vec<String>>,
    pub states: Mutex<Vec<SyncState>>,
    pub fail_upserts_for: Mutex<HashSet<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upserts_for(&self, import_id: &str) {
        self.fail_upserts_for
            .lock()
            .unwrap()
            .insert(import_id.to_string());
    }

    pub fn upserted_ids(&self) -> Vec<String> {
        self.upserts
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn saved_states(&self) -> Vec<SyncState> {
        self.states.lock().unwrap().clone()
    }

    pub fn last_state(&self) -> Option<SyncState> {
        self.states.lock().unwrap().last().cloned()
    }
}

impl SyncResultHandler for RecordingHandler {
    fn upsert_event(
        &self,
        event: &CalendarEvent,
        url: &str,
        etag: Option<&str>,
    ) -> Result<(), DavError> {
        let import_id = event.import_id();
        if self.fail_upserts_for.lock().unwrap().contains(&import_id) {
            return Err(DavError::Logic(format!("injected failure for {import_id}")));
        }
        self.upserts.lock().unwrap().push((
            import_id,
            url.to_string(),
            etag.map(str::to_string),
        ));
        Ok(())
    }

    fn delete_event(&self, import_id: &str) -> Result<(), DavError> {
        self.deletes.lock().unwrap().push(import_id.to_string());
        Ok(())
    }

    fn save_sync_state(&self, state: &SyncState) -> Result<(), DavError> {
        self.states.lock().unwrap().push(state.clone());
        Ok(())
    }
}

/// Callback that records lifecycle calls and answers conflicts with a
/// fixed resolution.
#[derive(Debug)]
pub struct RecordingCallback {
    pub resolution: ConflictResolution,
    pub started: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<(String, u32, u32)>>,
    pub conflicts: Mutex<Vec<EventConflict>>,
    pub completed: Mutex<Vec<SyncReport>>,
    pub errors: Mutex<Vec<DavError>>,
}

impl RecordingCallback {
    pub fn resolving_with(resolution: ConflictResolution) -> Self {
        Self {
            resolution,
            started: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            conflicts: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn new() -> Self {
        Self::resolving_with(ConflictResolution::UseRemote)
    }

    /// Asserts that progress never went backwards within a phase.
    pub fn assert_progress_monotone(&self) {
        let mut last: HashMap<String, u32> = HashMap::new();
        for (phase, current, _total) in self.progress.lock().unwrap().iter() {
            let entry = last.entry(phase.clone()).or_insert(0);
            assert!(
                *current >= *entry,
                "progress went backwards in phase {phase}: {current} < {entry}"
            );
            *entry = *current;
        }
    }
}

impl Default for RecordingCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncCallback for RecordingCallback {
    fn on_sync_started(&self, calendar_url: &str) {
        self.started.lock().unwrap().push(calendar_url.to_string());
    }

    fn on_progress(&self, message: &str, current: u32, total: u32) {
        self.progress
            .lock()
            .unwrap()
            .push((message.to_string(), current, total));
    }

    fn on_conflict(&self, conflict: &EventConflict) -> ConflictResolution {
        self.conflicts.lock().unwrap().push(conflict.clone());
        self.resolution
    }

    fn on_sync_complete(&self, report: &SyncReport) {
        self.completed.lock().unwrap().push(report.clone());
    }

    fn on_sync_error(&self, error: &DavError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}
