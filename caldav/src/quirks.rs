// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Per-server behavioral overrides.
//!
//! `CalDAV` servers agree on the RFCs and on little else. The quirks
//! object captures the differences the sync engine has to care about:
//! which collections to skip, how to format time-range boundaries, and
//! how a server signals an expired sync token.

use jiff::civil::Date;

use crate::types::Calendar;

/// Behavioral overrides for one server family.
///
/// Implementations are stateless statics; selection happens once per
/// client by substring match on the server URL.
pub trait ServerQuirks: Send + Sync + std::fmt::Debug {
    /// Human-readable family name, used in log output.
    fn name(&self) -> &'static str;

    /// Whether a discovered collection should be dropped from the
    /// calendar list.
    fn skip_calendar(&self, calendar: &Calendar) -> bool {
        skip_calendar_generic(calendar)
    }

    /// Whether the server rejects primary-password logins.
    fn requires_app_password(&self) -> bool {
        false
    }

    /// Extra headers attached to every request.
    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Formats a time-range boundary. Servers in this family reject
    /// anything other than UTC `YYYYMMDDT000000Z`.
    fn format_time_range_date(&self, date: Date) -> String {
        format!(
            "{:04}{:02}{:02}T000000Z",
            date.year(),
            date.month(),
            date.day()
        )
    }

    /// Whether an HTTP status/body pair means the sync token is no longer
    /// valid and the engine must fall back to a full sync.
    fn sync_token_invalid(&self, status: u16, body: &str) -> bool {
        status == 403 || status == 410 || body.contains("valid-sync-token")
    }
}

/// Collections no sync should touch: scheduling inbox/outbox, notification
/// and free/busy collections, plus task-only lists.
fn skip_calendar_generic(calendar: &Calendar) -> bool {
    let href = calendar.href.to_ascii_lowercase();
    let name = calendar.display_name.to_ascii_lowercase();

    let system_segment = ["/inbox", "/outbox", "/notification", "/freebusy"]
        .iter()
        .any(|seg| href.contains(seg));
    if system_segment {
        return true;
    }

    // VTODO-only collections are task lists, not calendars.
    let components = &calendar.supported_components;
    if !components.is_empty() && components.iter().all(|c| c == "VTODO") {
        return true;
    }

    ["tasks", "reminders", "todo"]
        .iter()
        .any(|word| name.contains(word))
}

/// Generic `CalDAV` server: RFC behavior, no overrides.
#[derive(Debug, Clone, Copy)]
pub struct GenericQuirks;

impl ServerQuirks for GenericQuirks {
    fn name(&self) -> &'static str {
        "generic"
    }
}

/// iCloud: app-specific passwords, partition-server redirects, CDATA in
/// calendar-data, and `Reminders` collections mixed into the home set.
#[derive(Debug, Clone, Copy)]
pub struct IcloudQuirks;

impl ServerQuirks for IcloudQuirks {
    fn name(&self) -> &'static str {
        "icloud"
    }

    fn requires_app_password(&self) -> bool {
        true
    }

    fn skip_calendar(&self, calendar: &Calendar) -> bool {
        if skip_calendar_generic(calendar) {
            return true;
        }
        // iCloud exposes the reminders store as a sibling collection.
        calendar.href.to_ascii_lowercase().contains("/reminders")
    }

    fn sync_token_invalid(&self, status: u16, body: &str) -> bool {
        // iCloud answers an expired token with 403 and an error body
        // rather than the RFC 6578 410.
        status == 403 || status == 410 || body.contains("valid-sync-token")
    }
}

/// Google Calendar over `CalDAV`.
#[derive(Debug, Clone, Copy)]
pub struct GoogleQuirks;

impl ServerQuirks for GoogleQuirks {
    fn name(&self) -> &'static str {
        "google"
    }
}

/// Fastmail.
#[derive(Debug, Clone, Copy)]
pub struct FastmailQuirks;

impl ServerQuirks for FastmailQuirks {
    fn name(&self) -> &'static str {
        "fastmail"
    }
}

static GENERIC: GenericQuirks = GenericQuirks;
static ICLOUD: IcloudQuirks = IcloudQuirks;
static GOOGLE: GoogleQuirks = GoogleQuirks;
static FASTMAIL: FastmailQuirks = FastmailQuirks;

/// Selects the quirks for a server URL by substring match.
#[must_use]
pub fn quirks_for(server_url: &str) -> &'static dyn ServerQuirks {
    let url = server_url.to_ascii_lowercase();
    if url.contains("icloud.com") {
        &ICLOUD
    } else if url.contains("google.com") || url.contains("googleapis.com") {
        &GOOGLE
    } else if url.contains("fastmail.com") {
        &FASTMAIL
    } else {
        &GENERIC
    }
}
