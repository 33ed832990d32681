// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! XML namespaces used in WebDAV/CalDAV request bodies.

/// XML namespaces declared by the request builders.
pub mod ns {
    /// `WebDAV` namespace.
    pub const DAV: &str = "DAV:";

    /// `CalDAV` namespace.
    pub const CALDAV: &str = "urn:ietf:params:xml:ns:caldav";

    /// CalendarServer extensions (`getctag`).
    pub const CALENDARSERVER: &str = "http://calendarserver.org/ns/";

    /// Apple extensions (`calendar-color`).
    pub const APPLE: &str = "http://apple.com/ns/ical/";
}
