// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Interface to the external iCalendar codec.

use std::collections::BTreeMap;

use crate::error::DavError;
use crate::event::CalendarEvent;

/// The decoded form of one iCalendar stream.
#[derive(Debug, Clone, Default)]
pub struct ParsedCalendar {
    /// Events in document order: master first, overrides after.
    pub events: Vec<CalendarEvent>,
    /// Calendar-level properties such as `X-WR-CALNAME`,
    /// `X-APPLE-CALENDAR-COLOR` and `REFRESH-INTERVAL`, keyed by
    /// uppercased property name.
    pub properties: BTreeMap<String, String>,
}

/// RFC 5545 parser/generator, treated as an opaque collaborator.
///
/// The sync core hands whole ICS payloads to `parse` and whole events to
/// `generate`; recurrence expansion and payload semantics stay on the
/// codec's side of the seam.
pub trait IcalCodec: Send + Sync + std::fmt::Debug {
    /// Parses an ICS stream into events plus calendar-level properties.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Ical`] when the payload is not a usable
    /// iCalendar object.
    fn parse(&self, ics: &str) -> Result<ParsedCalendar, DavError>;

    /// Serializes one event back into an ICS stream.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Ical`] when the event cannot be represented.
    fn generate(&self, event: &CalendarEvent) -> Result<String, DavError>;
}
