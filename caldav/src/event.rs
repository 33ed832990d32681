// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The opaque event record exchanged with the local store.

/// A calendar event as seen by the sync core.
///
/// The core never interprets or mutates payload fields; they exist so that
/// concurrent edits can be detected field-wise and so that RFC 5545
/// `SEQUENCE`/`DTSTAMP` ordering can be compared during conflict
/// resolution. Everything else about the event lives in the iCalendar
/// payload owned by the external codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CalendarEvent {
    /// Stable RFC 5545 UID.
    pub uid: String,
    /// `RECURRENCE-ID` value for an override of a recurring event.
    pub recurrence_id: Option<String>,
    /// RFC 5545 `SEQUENCE`; non-negative revision counter.
    pub sequence: u32,
    /// `DTSTAMP` in epoch milliseconds, when present.
    pub dtstamp_ms: Option<i64>,
    /// `SUMMARY` payload field.
    pub summary: Option<String>,
    /// `DESCRIPTION` payload field.
    pub description: Option<String>,
    /// `LOCATION` payload field.
    pub location: Option<String>,
    /// `DTSTART` payload field, opaque to the core.
    pub dt_start: Option<String>,
    /// `DTEND` payload field, opaque to the core.
    pub dt_end: Option<String>,
    /// `RRULE` payload field, opaque to the core.
    pub rrule: Option<String>,
}

impl CalendarEvent {
    /// Stable local-store identifier.
    ///
    /// Equals the UID for a master event; overrides append
    /// `:RECID:<recurrence-id>` so that each instance maps to its own
    /// local record.
    #[must_use]
    pub fn import_id(&self) -> String {
        match &self.recurrence_id {
            Some(rid) => format!("{}:RECID:{rid}", self.uid),
            None => self.uid.clone(),
        }
    }

    /// Field-wise comparison used for concurrent-edit detection.
    ///
    /// Compares summary, description, location, start, end and the
    /// canonical form of the recurrence rule. `ETag` and `SEQUENCE` are
    /// deliberately excluded: they track revisions, not content.
    #[must_use]
    pub fn fields_differ(&self, other: &Self) -> bool {
        self.summary != other.summary
            || self.description != other.description
            || self.location != other.location
            || self.dt_start != other.dt_start
            || self.dt_end != other.dt_end
            || canonical_rrule(self.rrule.as_deref()) != canonical_rrule(other.rrule.as_deref())
    }

    /// RFC 5545 revision ordering key: `(SEQUENCE, DTSTAMP)`.
    #[must_use]
    pub fn revision_key(&self) -> (u32, i64) {
        (self.sequence, self.dtstamp_ms.unwrap_or(0))
    }
}

/// Canonicalizes an RRULE for comparison: parts uppercased and sorted by
/// key, so `FREQ=WEEKLY;BYDAY=MO` equals `byday=mo;freq=weekly`.
fn canonical_rrule(rrule: Option<&str>) -> Option<String> {
    let rrule = rrule?;
    let mut parts: Vec<String> = rrule
        .split(';')
        .filter(|p| !p.is_empty())
        .map(|p| p.trim().to_ascii_uppercase())
        .collect();
    parts.sort();
    Some(parts.join(";"))
}
