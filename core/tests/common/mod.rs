// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities for integration tests: a line-oriented stand-in
//! codec, in-memory collaborator implementations, and multistatus body
//! factories.

#![allow(dead_code)]

mod codec;
mod stores;

pub use codec::{LineCodec, format_utc_ms, parse_utc_ms};
pub use stores::{MemoryProvider, RecordingCallback, RecordingHandler};

use davsync_caldav::{AuthMethod, CalDavClient, CalDavConfig, CalendarEvent};
use std::sync::Arc;
use wiremock::MockServer;

/// A client pointed at a mock server, decoding with [`LineCodec`].
pub fn client_for(server: &MockServer) -> Arc<CalDavClient> {
    let config = CalDavConfig {
        base_url: server.uri(),
        auth: AuthMethod::None,
        ..Default::default()
    };
    Arc::new(CalDavClient::new(config, Arc::new(LineCodec)).expect("Failed to create client"))
}

/// A minimal event fixture.
pub fn event(uid: &str, summary: &str) -> CalendarEvent {
    CalendarEvent {
        uid: uid.to_string(),
        summary: Some(summary.to_string()),
        ..CalendarEvent::default()
    }
}

/// ICS payload for a single event, as [`LineCodec`] understands it.
pub fn ics(uid: &str, summary: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:{summary}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
    )
}

/// ICS payload with a recurring master and one override, as published in
/// a single resource.
pub fn ics_with_override(uid: &str, master_summary: &str, override_summary: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n\
BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:{master_summary}\r\nRRULE:FREQ=WEEKLY\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:{uid}\r\nRECURRENCE-ID:20260310T090000Z\r\nSUMMARY:{override_summary}\r\nEND:VEVENT\r\n\
END:VCALENDAR\r\n"
    )
}

/// ICS payload carrying revision properties.
pub fn ics_with_revision(uid: &str, summary: &str, sequence: u32, dtstamp: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nSEQUENCE:{sequence}\r\nDTSTAMP:{dtstamp}\r\nSUMMARY:{summary}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
    )
}

/// One `<response>` with inline calendar data, CDATA-wrapped.
pub fn event_response(href: &str, etag: &str, ics: &str) -> String {
    format!(
        "<D:response>
  <D:href>{href}</D:href>
  <D:propstat>
    <D:prop>
      <D:getetag>\"{etag}\"</D:getetag>
      <C:calendar-data><![CDATA[{ics}]]></C:calendar-data>
    </D:prop>
    <D:status>HTTP/1.1 200 OK</D:status>
  </D:propstat>
</D:response>"
    )
}

/// One `<response>` reporting an href without data.
pub fn bare_response(href: &str, etag: &str) -> String {
    format!(
        "<D:response>
  <D:href>{href}</D:href>
  <D:propstat>
    <D:prop><D:getetag>\"{etag}\"</D:getetag></D:prop>
    <D:status>HTTP/1.1 200 OK</D:status>
  </D:propstat>
</D:response>"
    )
}

/// One `<response>` reporting a deletion.
pub fn deleted_response(href: &str) -> String {
    format!(
        "<D:response>
  <D:href>{href}</D:href>
  <D:status>HTTP/1.1 404 Not Found</D:status>
</D:response>"
    )
}

/// Wraps responses into a multistatus document.
pub fn multistatus(inner: &str, sync_token: Option<&str>) -> String {
    let token = sync_token
        .map(|t| format!("<D:sync-token>{t}</D:sync-token>"))
        .unwrap_or_default();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>
<D:multistatus xmlns:D=\"DAV:\" xmlns:C=\"urn:ietf:params:xml:ns:caldav\">
{inner}
{token}
</D:multistatus>"
    )
}

/// Multistatus answering a ctag PROPFIND.
pub fn ctag_body(href: &str, ctag: &str) -> String {
    multistatus(
        &format!(
            "<D:response>
  <D:href>{href}</D:href>
  <D:propstat>
    <D:prop><CS:getctag xmlns:CS=\"http://calendarserver.org/ns/\">{ctag}</CS:getctag></D:prop>
    <D:status>HTTP/1.1 200 OK</D:status>
  </D:propstat>
</D:response>"
        ),
        None,
    )
}
