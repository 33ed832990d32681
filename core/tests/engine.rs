// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Pull engine behavior: ctag gating, reconciliation, conflicts,
//! incremental deltas and token fallback.

mod common;

use std::sync::Arc;

use common::{
    MemoryProvider, RecordingCallback, RecordingHandler, bare_response, client_for, ctag_body,
    deleted_response, event, event_response, ics, ics_with_override, multistatus,
};
use davsync_core::{ConflictResolution, SyncEngine, SyncState};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Setup {
    server: MockServer,
    provider: Arc<MemoryProvider>,
    handler: Arc<RecordingHandler>,
    callback: Arc<RecordingCallback>,
    engine: SyncEngine,
}

async fn setup_with(resolution: ConflictResolution) -> Setup {
    let server = MockServer::start().await;
    let provider = Arc::new(MemoryProvider::new());
    let handler = Arc::new(RecordingHandler::new());
    let callback = Arc::new(RecordingCallback::resolving_with(resolution));
    let engine = SyncEngine::new(client_for(&server), provider.clone(), handler.clone())
        .with_callback(callback.clone());
    Setup {
        server,
        provider,
        handler,
        callback,
        engine,
    }
}

async fn setup() -> Setup {
    setup_with(ConflictResolution::UseRemote).await
}

fn cal(server: &MockServer) -> String {
    format!("{}/cal/personal/", server.uri())
}

async fn mount_ctag(server: &MockServer, ctag: &str) {
    Mock::given(method("PROPFIND"))
        .and(path("/cal/personal/"))
        .respond_with(
            ResponseTemplate::new(207)
                .set_body_raw(ctag_body("/cal/personal/", ctag), "application/xml"),
        )
        .mount(server)
        .await;
}

async fn mount_query(server: &MockServer, responses: &str) {
    Mock::given(method("REPORT"))
        .and(path("/cal/personal/"))
        .and(body_string_contains("calendar-query"))
        .respond_with(
            ResponseTemplate::new(207)
                .set_body_raw(multistatus(responses, None), "application/xml"),
        )
        .mount(server)
        .await;
}

async fn mount_token_probe(server: &MockServer, token: &str) {
    Mock::given(method("REPORT"))
        .and(path("/cal/personal/"))
        .and(body_string_contains("sync-collection"))
        .and(body_string_contains("sync-token/>"))
        .respond_with(
            ResponseTemplate::new(207)
                .set_body_raw(multistatus("", Some(token)), "application/xml"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn engine_ctag_short_circuit_saves_nothing() {
    let s = setup().await;
    mount_ctag(&s.server, "unchanged-ctag").await;

    let mut previous = SyncState::empty(cal(&s.server));
    previous.ctag = Some("unchanged-ctag".to_string());

    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(report.success());
    assert!(report.unchanged);
    assert!(report.upserted.is_empty());
    assert!(report.deleted.is_empty());
    assert!(report.conflicts.is_empty());
    // No state write on the short-circuit path.
    assert!(s.handler.saved_states().is_empty());
    // Only the ctag PROPFIND went out.
    assert_eq!(s.server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_full_sync_upserts_deletes_and_saves_state() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-2").await;
    mount_query(
        &s.server,
        &format!(
            "{}\n{}",
            event_response("/cal/personal/a.ics", "ea", &ics("a@x", "Alpha")),
            event_response("/cal/personal/b.ics", "eb", &ics("b@x", "Beta")),
        ),
    )
    .await;
    mount_token_probe(&s.server, "probe-token-1").await;

    // A local event the server no longer has.
    s.provider.insert(event("stale@x", "Stale"));

    let previous = SyncState::empty(cal(&s.server));
    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(report.success(), "errors: {:?}", report.errors);
    assert!(!report.unchanged);
    assert_eq!(report.upserted, vec!["a@x".to_string(), "b@x".to_string()]);
    assert_eq!(report.deleted, vec!["stale@x".to_string()]);
    assert_eq!(s.handler.deleted_ids(), vec!["stale@x".to_string()]);

    let state = s.handler.last_state().expect("state must be saved");
    assert_eq!(state.ctag.as_deref(), Some("ctag-2"));
    assert_eq!(state.sync_token.as_deref(), Some("probe-token-1"));
    assert_eq!(state.etags.get("/cal/personal/a.ics").unwrap(), "ea");
    assert_eq!(state.etags.get("/cal/personal/b.ics").unwrap(), "eb");
    assert_eq!(state.url_map.get("a@x").unwrap(), "/cal/personal/a.ics");
    assert!(state.last_sync_ms > 0);

    s.callback.assert_progress_monotone();
    assert_eq!(s.callback.started.lock().unwrap().len(), 1);
    assert_eq!(s.callback.completed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn engine_conflict_defaults_to_remote_copy() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-3").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea-2", &ics("a@x", "Server edit")),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    // Server etag moved and the local copy differs: both sides changed.
    s.provider.insert(event("a@x", "Local edit"));
    let mut previous = SyncState::empty(cal(&s.server));
    previous.etags.insert("/cal/personal/a.ics".to_string(), "ea-1".to_string());

    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(report.success());
    assert_eq!(report.upserted, vec!["a@x".to_string()]);
    // UseRemote resolutions are applied, not recorded.
    assert!(report.conflicts.is_empty());
    assert_eq!(s.callback.conflicts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn engine_conflict_skip_records_and_applies_nothing() {
    let s = setup_with(ConflictResolution::Skip).await;
    mount_ctag(&s.server, "ctag-3").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea-2", &ics("a@x", "Server edit")),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    s.provider.insert(event("a@x", "Local edit"));
    let mut previous = SyncState::empty(cal(&s.server));
    previous.etags.insert("/cal/personal/a.ics".to_string(), "ea-1".to_string());

    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(report.upserted.is_empty());
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].import_id, "a@x");
    assert!(s.handler.upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn engine_keep_both_applies_server_and_records_conflict() {
    let s = setup_with(ConflictResolution::KeepBoth).await;
    mount_ctag(&s.server, "ctag-3").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea-2", &ics("a@x", "Server edit")),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    s.provider.insert(event("a@x", "Local edit"));
    let mut previous = SyncState::empty(cal(&s.server));
    previous.etags.insert("/cal/personal/a.ics".to_string(), "ea-1".to_string());

    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert_eq!(report.upserted, vec!["a@x".to_string()]);
    assert_eq!(report.conflicts.len(), 1);
}

#[tokio::test]
async fn engine_local_only_edit_is_not_clobbered() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-4").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea-1", &ics("a@x", "Server copy")),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    // Local differs but the server etag did not move: the edit is local
    // only and belongs to the push path.
    s.provider.insert(event("a@x", "Local edit"));
    let mut previous = SyncState::empty(cal(&s.server));
    previous.etags.insert("/cal/personal/a.ics".to_string(), "ea-1".to_string());

    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(report.upserted.is_empty());
    assert!(report.conflicts.is_empty());
    assert!(s.handler.upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn engine_server_changed_only_is_reapplied() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-5").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea-9", &ics("a@x", "Same")),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    // The etag moved but the compared fields happen to match: the server
    // copy is still applied — the comparison covers only a subset of the
    // payload, and the state records the new etag either way.
    s.provider.insert(event("a@x", "Same"));
    let mut previous = SyncState::empty(cal(&s.server));
    previous.etags.insert("/cal/personal/a.ics".to_string(), "ea-1".to_string());

    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(report.success());
    assert_eq!(report.upserted, vec!["a@x".to_string()]);
    // Identical fields mean no concurrent edit, so no conflict either.
    assert!(report.conflicts.is_empty());
    assert!(s.callback.conflicts.lock().unwrap().is_empty());

    let state = s.handler.last_state().expect("state must be saved");
    assert_eq!(state.etags.get("/cal/personal/a.ics").unwrap(), "ea-9");
}

#[tokio::test]
async fn engine_unmoved_etag_is_not_reapplied() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-5b").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea-1", &ics("a@x", "Same")),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    // Nothing moved on either side: the recorded etag still matches and
    // the local copy agrees, so nothing is applied.
    s.provider.insert(event("a@x", "Same"));
    let mut previous = SyncState::empty(cal(&s.server));
    previous.etags.insert("/cal/personal/a.ics".to_string(), "ea-1".to_string());

    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(report.success());
    assert!(report.upserted.is_empty());
    assert!(report.conflicts.is_empty());
    assert!(s.handler.upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn engine_handler_failure_does_not_abort_apply() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-6").await;
    mount_query(
        &s.server,
        &format!(
            "{}\n{}",
            event_response("/cal/personal/a.ics", "ea", &ics("a@x", "Alpha")),
            event_response("/cal/personal/b.ics", "eb", &ics("b@x", "Beta")),
        ),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    s.handler.fail_upserts_for("a@x");

    let previous = SyncState::empty(cal(&s.server));
    let report = s.engine.sync(&cal(&s.server), &previous).await;

    // The failing upsert is recorded, the rest of the apply continued.
    assert!(!report.success());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.upserted, vec!["b@x".to_string()]);
    // The state snapshot still goes out at the end of the algorithm.
    assert!(s.handler.last_state().is_some());
}

#[tokio::test]
async fn engine_incremental_applies_delta() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-9").await;

    // The delta: one change inline, one without data, one deletion.
    Mock::given(method("REPORT"))
        .and(path("/cal/personal/"))
        .and(body_string_contains("sync-collection"))
        .and(body_string_contains("t0"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            multistatus(
                &format!(
                    "{}\n{}\n{}",
                    event_response("/cal/personal/changed.ics", "ec-2", &ics("changed@x", "New")),
                    bare_response("/cal/personal/lazy.ics", "el-1"),
                    deleted_response("/cal/personal/gone.ics"),
                ),
                Some("t1"),
            ),
            "application/xml",
        ))
        .mount(&s.server)
        .await;

    // Multiget for the href the server reported without data.
    Mock::given(method("REPORT"))
        .and(path("/cal/personal/"))
        .and(body_string_contains("calendar-multiget"))
        .and(body_string_contains("lazy.ics"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            multistatus(
                &event_response("/cal/personal/lazy.ics", "el-1", &ics("lazy@x", "Lazy")),
                None,
            ),
            "application/xml",
        ))
        .mount(&s.server)
        .await;

    s.provider.insert(event("keep@x", "Keep"));
    s.provider.insert(event("gone@x", "Gone"));

    let mut previous = SyncState::empty(cal(&s.server));
    previous.sync_token = Some("t0".to_string());
    previous.ctag = Some("ctag-8".to_string());
    previous
        .etags
        .insert("/cal/personal/keep.ics".to_string(), "ek".to_string());
    previous
        .etags
        .insert("/cal/personal/gone.ics".to_string(), "eg".to_string());
    previous
        .url_map
        .insert("keep@x".to_string(), "/cal/personal/keep.ics".to_string());
    previous
        .url_map
        .insert("gone@x".to_string(), "/cal/personal/gone.ics".to_string());

    let report = s.engine.sync_incremental(&cal(&s.server), &previous, false).await;

    assert!(report.success(), "errors: {:?}", report.errors);
    assert!(report.incremental);
    assert_eq!(
        report.upserted,
        vec!["changed@x".to_string(), "lazy@x".to_string()]
    );
    // Deletions are translated through the previous url map; the
    // untouched local event survives even though the delta omits it.
    assert_eq!(report.deleted, vec!["gone@x".to_string()]);
    assert!(!s.handler.deleted_ids().contains(&"keep@x".to_string()));

    let state = s.handler.last_state().expect("state must be saved");
    assert_eq!(state.sync_token.as_deref(), Some("t1"));
    assert_eq!(state.ctag.as_deref(), Some("ctag-9"));
    assert!(state.etags.contains_key("/cal/personal/keep.ics"));
    assert!(!state.etags.contains_key("/cal/personal/gone.ics"));
    assert_eq!(state.etags.get("/cal/personal/changed.ics").unwrap(), "ec-2");
    assert!(!state.url_map.contains_key("gone@x"));
    assert_eq!(state.url_map.get("lazy@x").unwrap(), "/cal/personal/lazy.ics");
}

#[tokio::test]
async fn engine_expired_token_falls_back_to_full_sync() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-1").await;

    // The delta request with the stale token is rejected with 410 Gone.
    Mock::given(method("REPORT"))
        .and(path("/cal/personal/"))
        .and(body_string_contains("expired-token"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&s.server)
        .await;

    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea", &ics("a@x", "Alpha")),
    )
    .await;
    mount_token_probe(&s.server, "fresh-token").await;

    let mut previous = SyncState::empty(cal(&s.server));
    previous.sync_token = Some("expired-token".to_string());

    let report = s.engine.sync_incremental(&cal(&s.server), &previous, false).await;

    assert!(report.success(), "errors: {:?}", report.errors);
    assert!(!report.incremental);
    assert_eq!(report.upserted, vec!["a@x".to_string()]);

    // The full sync probed for a replacement token.
    let state = s.handler.last_state().expect("state must be saved");
    assert_eq!(state.sync_token.as_deref(), Some("fresh-token"));
    // The callback saw one sync, not two.
    assert_eq!(s.callback.started.lock().unwrap().len(), 1);
    assert_eq!(s.callback.completed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn engine_force_full_ignores_token() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-1").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea", &ics("a@x", "Alpha")),
    )
    .await;
    mount_token_probe(&s.server, "t2").await;

    let mut previous = SyncState::empty(cal(&s.server));
    previous.sync_token = Some("t1".to_string());

    let report = s.engine.sync_incremental(&cal(&s.server), &previous, true).await;

    assert!(report.success());
    assert!(!report.incremental);
    // No sync-collection REPORT with the stored token went out.
    let requests = s.server.received_requests().await.unwrap();
    let with_token = requests.iter().any(|r| {
        String::from_utf8_lossy(&r.body).contains("<D:sync-token>t1</D:sync-token>")
    });
    assert!(!with_token);
}

#[tokio::test]
async fn engine_recurring_resource_yields_master_and_override() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-r").await;
    mount_query(
        &s.server,
        &event_response(
            "/cal/personal/weekly.ics",
            "er",
            &ics_with_override("weekly@x", "Standup", "Standup (moved)"),
        ),
    )
    .await;
    mount_token_probe(&s.server, "t").await;

    let report = s.engine.sync(&cal(&s.server), &SyncState::empty(cal(&s.server))).await;

    assert!(report.success(), "errors: {:?}", report.errors);
    assert_eq!(
        report.upserted,
        vec![
            "weekly@x".to_string(),
            "weekly@x:RECID:20260310T090000Z".to_string(),
        ]
    );

    // Both instances map to the same resource in the url map.
    let state = s.handler.last_state().expect("state must be saved");
    assert_eq!(state.url_map.get("weekly@x").unwrap(), "/cal/personal/weekly.ics");
    assert_eq!(
        state.url_map.get("weekly@x:RECID:20260310T090000Z").unwrap(),
        "/cal/personal/weekly.ics"
    );
}

#[tokio::test]
async fn engine_incremental_delete_removes_master_and_override() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-r2").await;

    Mock::given(method("REPORT"))
        .and(path("/cal/personal/"))
        .and(body_string_contains("sync-collection"))
        .and(body_string_contains("t0"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            multistatus(&deleted_response("/cal/personal/weekly.ics"), Some("t1")),
            "application/xml",
        ))
        .mount(&s.server)
        .await;

    let mut master = event("weekly@x", "Standup");
    master.rrule = Some("FREQ=WEEKLY".to_string());
    s.provider.insert(master);
    let mut override_ = event("weekly@x", "Standup (moved)");
    override_.recurrence_id = Some("20260310T090000Z".to_string());
    s.provider.insert(override_);

    let mut previous = SyncState::empty(cal(&s.server));
    previous.sync_token = Some("t0".to_string());
    previous
        .url_map
        .insert("weekly@x".to_string(), "/cal/personal/weekly.ics".to_string());
    previous.url_map.insert(
        "weekly@x:RECID:20260310T090000Z".to_string(),
        "/cal/personal/weekly.ics".to_string(),
    );

    let report = s.engine.sync_incremental(&cal(&s.server), &previous, false).await;

    assert!(report.success(), "errors: {:?}", report.errors);
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(
        deleted,
        vec![
            "weekly@x".to_string(),
            "weekly@x:RECID:20260310T090000Z".to_string(),
        ]
    );

    let state = s.handler.last_state().expect("state must be saved");
    assert!(state.url_map.is_empty());
}

#[tokio::test]
async fn engine_second_full_sync_with_saved_state_is_a_no_op() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-stable").await;
    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea", &ics("a@x", "Alpha")),
    )
    .await;
    mount_token_probe(&s.server, "t1").await;

    let first = s.engine.sync(&cal(&s.server), &SyncState::empty(cal(&s.server))).await;
    assert!(first.success());
    assert_eq!(first.upserted, vec!["a@x".to_string()]);
    let saved = s.handler.last_state().expect("state must be saved");

    // The local store now mirrors the server.
    s.provider.insert(event("a@x", "Alpha"));

    let second = s.engine.sync(&cal(&s.server), &saved).await;
    assert!(second.success());
    assert!(second.unchanged);
    assert!(second.upserted.is_empty());
    assert!(second.deleted.is_empty());
    // Still only the state from the first sync.
    assert_eq!(s.handler.saved_states().len(), 1);
}

#[tokio::test]
async fn engine_empty_delta_without_token_falls_back_to_full_sync() {
    let s = setup().await;
    mount_ctag(&s.server, "ctag-1").await;

    // Some servers answer an incremental request with an empty 207 and
    // no replacement token; that delta is unusable.
    Mock::given(method("REPORT"))
        .and(path("/cal/personal/"))
        .and(body_string_contains("sync-collection"))
        .and(body_string_contains("t0"))
        .respond_with(
            ResponseTemplate::new(207).set_body_raw(multistatus("", None), "application/xml"),
        )
        .mount(&s.server)
        .await;

    mount_query(
        &s.server,
        &event_response("/cal/personal/a.ics", "ea", &ics("a@x", "Alpha")),
    )
    .await;
    mount_token_probe(&s.server, "replacement").await;

    let mut previous = SyncState::empty(cal(&s.server));
    previous.sync_token = Some("t0".to_string());

    let report = s.engine.sync_incremental(&cal(&s.server), &previous, false).await;

    assert!(report.success(), "errors: {:?}", report.errors);
    assert!(!report.incremental);
    assert_eq!(report.upserted, vec!["a@x".to_string()]);
    let state = s.handler.last_state().expect("state must be saved");
    assert_eq!(state.sync_token.as_deref(), Some("replacement"));
}

#[tokio::test]
async fn engine_http_error_aborts_with_failed_report() {
    let s = setup().await;

    Mock::given(method("PROPFIND"))
        .and(path("/cal/personal/"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&s.server)
        .await;

    let previous = SyncState::empty(cal(&s.server));
    let report = s.engine.sync(&cal(&s.server), &previous).await;

    assert!(!report.success());
    assert_eq!(report.errors.len(), 1);
    assert!(s.handler.saved_states().is_empty());
    assert_eq!(s.callback.errors.lock().unwrap().len(), 1);
}
