// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The pull engine: ctag-gated full sync and RFC 6578 incremental sync.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use davsync_caldav::{CalDavClient, CalendarEvent, DavError, RemoteEvent};

use crate::local::{LocalEventProvider, SyncCallback, SyncResultHandler};
use crate::ops::now_ms;
use crate::report::{ConflictResolution, EventConflict, RecordedConflict, SyncReport};
use crate::state::SyncState;

/// Pulls server changes into the local store.
///
/// The engine never mutates events and never writes persistent state
/// itself: events go out through [`SyncResultHandler`] and the new
/// [`SyncState`] snapshot is emitted through
/// [`SyncResultHandler::save_sync_state`]. HTTP and network errors abort
/// a sync; handler errors are trapped per event and the apply continues.
#[derive(Clone)]
pub struct SyncEngine {
    client: Arc<CalDavClient>,
    provider: Arc<dyn LocalEventProvider>,
    handler: Arc<dyn SyncResultHandler>,
    callback: Option<Arc<dyn SyncCallback>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates an engine over the client and the caller's store
    /// interfaces.
    #[must_use]
    pub fn new(
        client: Arc<CalDavClient>,
        provider: Arc<dyn LocalEventProvider>,
        handler: Arc<dyn SyncResultHandler>,
    ) -> Self {
        Self {
            client,
            provider,
            handler,
            callback: None,
        }
    }

    /// Attaches progress/conflict callbacks.
    #[must_use]
    pub fn with_callback(mut self, callback: Arc<dyn SyncCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Runs a full sync, ignoring any stored sync token. The emitted
    /// state still carries a fresh token (probed at the end), so a later
    /// incremental sync can pick up where this one left off.
    pub async fn sync(&self, calendar_url: &str, previous: &SyncState) -> SyncReport {
        self.emit_started(calendar_url);
        let report = match self.run_full(calendar_url, previous).await {
            Ok(report) => report,
            Err(e) => self.error_report(calendar_url, false, e),
        };
        self.emit_finished(&report);
        report
    }

    /// Runs an incremental sync when a previous token exists and
    /// `force_full_sync` is false; otherwise a full sync.
    ///
    /// An expired token (per the server's quirks) and an empty success
    /// without a new token both fall back to a full sync automatically.
    pub async fn sync_incremental(
        &self,
        calendar_url: &str,
        previous: &SyncState,
        force_full_sync: bool,
    ) -> SyncReport {
        let token = previous.sync_token.clone().unwrap_or_default();
        self.emit_started(calendar_url);

        let result = if force_full_sync || token.is_empty() {
            self.run_full(calendar_url, previous).await
        } else {
            match self.run_incremental(calendar_url, previous, &token).await {
                Ok(Some(report)) => Ok(report),
                Ok(None) => {
                    tracing::info!(calendar_url, "empty delta without token, falling back to full sync");
                    self.run_full(calendar_url, previous).await
                }
                Err(DavError::Http { code, message })
                    if self.client.quirks().sync_token_invalid(code, &message) =>
                {
                    tracing::info!(calendar_url, code, "sync token rejected, falling back to full sync");
                    self.run_full(calendar_url, previous).await
                }
                Err(e) => Err(e),
            }
        };

        let report = match result {
            Ok(report) => report,
            Err(e) => self.error_report(calendar_url, true, e),
        };
        self.emit_finished(&report);
        report
    }

    async fn run_full(
        &self,
        calendar_url: &str,
        previous: &SyncState,
    ) -> Result<SyncReport, DavError> {
        self.progress("check", 0, 1);
        let current_ctag = self.client.get_ctag(calendar_url).await?;
        self.progress("check", 1, 1);

        // Ctag short-circuit applies only to full sync; an unchanged
        // collection costs one PROPFIND and saves no state.
        if let (Some(current), Some(prev)) = (&current_ctag, &previous.ctag) {
            if current == prev {
                self.progress("complete", 1, 1);
                return Ok(SyncReport {
                    calendar_url: calendar_url.to_string(),
                    unchanged: true,
                    ..SyncReport::default()
                });
            }
        }

        self.progress("fetch", 0, 1);
        let remote = self.client.fetch_events(calendar_url, None).await?;
        self.progress("fetch", 1, 1);

        let mut report = SyncReport {
            calendar_url: calendar_url.to_string(),
            ..SyncReport::default()
        };

        let local_index = self.local_index(calendar_url);
        self.reconcile(calendar_url, previous, &remote, &local_index, &mut report);

        // Local events the server no longer has.
        let server_ids: HashSet<String> = remote.iter().map(|r| r.event.import_id()).collect();
        let stale: Vec<String> = local_index
            .keys()
            .filter(|id| !server_ids.contains(*id))
            .cloned()
            .collect();
        let total = u32::try_from(stale.len()).unwrap_or(u32::MAX);
        self.progress("apply", 0, total);
        for (i, import_id) in stale.iter().enumerate() {
            self.apply_delete(import_id, &mut report);
            self.progress("apply", u32::try_from(i + 1).unwrap_or(u32::MAX), total);
        }

        // Probe for an initial token so the next sync can go incremental.
        let sync_token = match self.client.sync_collection(calendar_url, "").await {
            Ok(delta) => delta.new_sync_token,
            Err(e) => {
                tracing::warn!(calendar_url, error = %e, "sync token probe failed");
                None
            }
        };

        let mut etags = HashMap::new();
        let mut url_map = HashMap::new();
        for r in &remote {
            if let Some(etag) = &r.etag {
                etags.insert(r.href.clone(), etag.as_str().to_string());
            }
            url_map.insert(r.event.import_id(), r.href.clone());
        }
        let state = SyncState {
            calendar_url: calendar_url.to_string(),
            ctag: current_ctag,
            sync_token,
            etags,
            url_map,
            last_sync_ms: now_ms(),
        };
        self.save_state(&state, &mut report);

        self.progress("complete", 1, 1);
        Ok(report)
    }

    /// Returns `Ok(None)` when the delta is unusable (empty success with
    /// no new token) and a full sync must run instead.
    async fn run_incremental(
        &self,
        calendar_url: &str,
        previous: &SyncState,
        token: &str,
    ) -> Result<Option<SyncReport>, DavError> {
        self.progress("check", 0, 1);
        let delta = self.client.sync_collection(calendar_url, token).await?;
        self.progress("check", 1, 1);

        if delta.new_sync_token.is_none()
            && delta.added.is_empty()
            && delta.added_hrefs.is_empty()
            && delta.deleted_hrefs.is_empty()
        {
            return Ok(None);
        }

        // Some servers omit calendar-data in the delta; fetch those
        // resources explicitly before reconciling.
        self.progress("fetch", 0, 1);
        let mut remote = delta.added.clone();
        let fetched = self
            .client
            .fetch_events_by_href(calendar_url, &delta.added_hrefs)
            .await?;
        remote.extend(fetched);
        self.progress("fetch", 1, 1);

        let mut report = SyncReport {
            calendar_url: calendar_url.to_string(),
            incremental: true,
            ..SyncReport::default()
        };

        let local_index = self.local_index(calendar_url);
        self.reconcile(calendar_url, previous, &remote, &local_index, &mut report);

        // Deletions come exclusively from the delta: an RFC 6578 report
        // is partial, so absence proves nothing here.
        let mut deleted_ids = Vec::new();
        for href in &delta.deleted_hrefs {
            let mut found = false;
            for (id, mapped) in &previous.url_map {
                if mapped == href {
                    deleted_ids.push(id.clone());
                    found = true;
                }
            }
            if !found {
                tracing::debug!(%href, "delta deletion for unknown resource");
            }
        }
        let total = u32::try_from(deleted_ids.len()).unwrap_or(u32::MAX);
        self.progress("apply", 0, total);
        for (i, import_id) in deleted_ids.iter().enumerate() {
            self.apply_delete(import_id, &mut report);
            self.progress("apply", u32::try_from(i + 1).unwrap_or(u32::MAX), total);
        }

        let current_ctag = match self.client.get_ctag(calendar_url).await {
            Ok(ctag) => ctag,
            Err(e) => {
                tracing::warn!(calendar_url, error = %e, "ctag refresh failed");
                None
            }
        };

        let mut etags = previous.etags.clone();
        let mut url_map = previous.url_map.clone();
        for href in &delta.deleted_hrefs {
            etags.remove(href);
            url_map.retain(|_, mapped| mapped != href);
        }
        for r in &remote {
            if let Some(etag) = &r.etag {
                etags.insert(r.href.clone(), etag.as_str().to_string());
            }
            url_map.insert(r.event.import_id(), r.href.clone());
        }
        let state = SyncState {
            calendar_url: calendar_url.to_string(),
            ctag: current_ctag,
            sync_token: delta.new_sync_token.clone().or_else(|| Some(token.to_string())),
            etags,
            url_map,
            last_sync_ms: now_ms(),
        };
        self.save_state(&state, &mut report);

        self.progress("complete", 1, 1);
        Ok(Some(report))
    }

    /// Reconciles server events against the local index.
    ///
    /// A conflict needs both sides changed: the server `ETag` moved away
    /// from the recorded one AND the local copy differs field-wise from
    /// the server copy. When the `ETag` moved but the compared fields
    /// match, the server copy is still applied — the comparison covers
    /// only a subset of the payload, and the recorded `ETag` advances
    /// either way. Only an unmoved server `ETag` short-circuits: a
    /// differing local copy then is a local-only edit waiting for push
    /// and must not be clobbered.
    fn reconcile(
        &self,
        calendar_url: &str,
        previous: &SyncState,
        remote: &[RemoteEvent],
        local_index: &HashMap<String, CalendarEvent>,
        report: &mut SyncReport,
    ) {
        let total = u32::try_from(remote.len()).unwrap_or(u32::MAX);
        self.progress("process", 0, total);

        for (i, r) in remote.iter().enumerate() {
            let import_id = r.event.import_id();
            let previous_etag = previous.etags.get(&r.href);
            let server_changed = match (previous_etag, &r.etag) {
                (Some(prev), Some(current)) => prev != current.as_str(),
                _ => true,
            };

            match local_index.get(&import_id) {
                None => self.apply_upsert(r, &import_id, report),
                // Local-only edit or nothing changed; push owns it.
                Some(_) if !server_changed => {}
                Some(local) if local.fields_differ(&r.event) => {
                    let conflict = EventConflict {
                        calendar_url: calendar_url.to_string(),
                        import_id: import_id.clone(),
                        href: r.href.clone(),
                        local: local.clone(),
                        remote: r.event.clone(),
                    };
                    let resolution = self
                        .callback
                        .as_ref()
                        .map_or(ConflictResolution::UseRemote, |cb| cb.on_conflict(&conflict));
                    tracing::debug!(%import_id, ?resolution, "both sides modified");
                    match resolution {
                        ConflictResolution::UseRemote => self.apply_upsert(r, &import_id, report),
                        ConflictResolution::UseLocal => {}
                        ConflictResolution::KeepBoth => {
                            self.apply_upsert(r, &import_id, report);
                            report.conflicts.push(RecordedConflict {
                                import_id: import_id.clone(),
                                href: r.href.clone(),
                                resolution,
                            });
                        }
                        ConflictResolution::Skip => {
                            report.conflicts.push(RecordedConflict {
                                import_id: import_id.clone(),
                                href: r.href.clone(),
                                resolution,
                            });
                        }
                    }
                }
                // Server-changed-only (or unchanged first sync): the
                // compared fields match but the payload moved; apply it.
                Some(_) => self.apply_upsert(r, &import_id, report),
            }

            self.progress("process", u32::try_from(i + 1).unwrap_or(u32::MAX), total);
        }
    }

    fn local_index(&self, calendar_url: &str) -> HashMap<String, CalendarEvent> {
        self.provider
            .local_events(calendar_url)
            .into_iter()
            .map(|event| (event.import_id(), event))
            .collect()
    }

    fn apply_upsert(&self, r: &RemoteEvent, import_id: &str, report: &mut SyncReport) {
        let etag = r.etag.as_ref().map(|e| e.as_str());
        match self.handler.upsert_event(&r.event, &r.href, etag) {
            Ok(()) => report.upserted.push(import_id.to_string()),
            Err(e) => {
                tracing::warn!(import_id, error = %e, "upsert failed, continuing");
                report.errors.push(e);
            }
        }
    }

    fn apply_delete(&self, import_id: &str, report: &mut SyncReport) {
        match self.handler.delete_event(import_id) {
            Ok(()) => report.deleted.push(import_id.to_string()),
            Err(e) => {
                tracing::warn!(import_id, error = %e, "delete failed, continuing");
                report.errors.push(e);
            }
        }
    }

    fn save_state(&self, state: &SyncState, report: &mut SyncReport) {
        if let Err(e) = self.handler.save_sync_state(state) {
            tracing::warn!(calendar_url = %state.calendar_url, error = %e, "state save failed");
            report.errors.push(e);
        }
    }

    fn error_report(&self, calendar_url: &str, incremental: bool, error: DavError) -> SyncReport {
        tracing::error!(calendar_url, %error, "sync aborted");
        if let Some(cb) = &self.callback {
            cb.on_sync_error(&error);
        }
        SyncReport {
            calendar_url: calendar_url.to_string(),
            incremental,
            errors: vec![error],
            ..SyncReport::default()
        }
    }

    fn emit_started(&self, calendar_url: &str) {
        tracing::debug!(calendar_url, "sync started");
        if let Some(cb) = &self.callback {
            cb.on_sync_started(calendar_url);
        }
    }

    fn emit_finished(&self, report: &SyncReport) {
        tracing::debug!(
            calendar_url = %report.calendar_url,
            upserted = report.upserted.len(),
            deleted = report.deleted.len(),
            conflicts = report.conflicts.len(),
            errors = report.errors.len(),
            "sync finished"
        );
        if let Some(cb) = &self.callback {
            cb.on_sync_complete(report);
        }
    }

    fn progress(&self, message: &str, current: u32, total: u32) {
        if let Some(cb) = &self.callback {
            cb.on_progress(message, current, total);
        }
    }
}
