// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request body builders for WebDAV/CalDAV operations.
//!
//! All builders emit UTF-8 XML through [`quick_xml::Writer`], which escapes
//! `& < > " '` in user-supplied text and attribute values. The
//! calendar-query and calendar-multiget bodies use lowercase `c:`/`d:`
//! prefixes; several strict servers reject those reports with uppercase
//! prefixes while accepting them for PROPFIND.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::DavError;
use crate::xml::ns;

fn into_xml(writer: Writer<Cursor<Vec<u8>>>) -> Result<String, DavError> {
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| DavError::Parse(format!("UTF-8 error: {e}")))
}

/// PROPFIND request builder.
#[derive(Debug)]
pub struct PropFindRequest {
    props: Vec<Prop>,
}

/// Properties to request in PROPFIND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop {
    /// RFC 3744 principal of the authenticated user.
    CurrentUserPrincipal,
    /// Display name.
    DisplayName,
    /// Resource type.
    ResourceType,
    /// `ETag`.
    GetETag,
    /// CalendarServer collection tag.
    GetCtag,
    /// RFC 6578 sync token.
    SyncToken,
    /// Calendar home set.
    CalendarHomeSet,
    /// Supported calendar components.
    SupportedCalendarComponents,
    /// Calendar description.
    CalendarDescription,
    /// Apple calendar color.
    CalendarColor,
    /// Privileges of the current user on the collection.
    CurrentUserPrivilegeSet,
}

/// Prefix a property is emitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Dav,
    CalDav,
    CalendarServer,
    Apple,
}

impl Prop {
    const fn name(self) -> &'static str {
        match self {
            Self::CurrentUserPrincipal => "current-user-principal",
            Self::DisplayName => "displayname",
            Self::ResourceType => "resourcetype",
            Self::GetETag => "getetag",
            Self::GetCtag => "getctag",
            Self::SyncToken => "sync-token",
            Self::CalendarHomeSet => "calendar-home-set",
            Self::SupportedCalendarComponents => "supported-calendar-component-set",
            Self::CalendarDescription => "calendar-description",
            Self::CalendarColor => "calendar-color",
            Self::CurrentUserPrivilegeSet => "current-user-privilege-set",
        }
    }

    const fn namespace(self) -> Ns {
        match self {
            Self::CurrentUserPrincipal
            | Self::DisplayName
            | Self::ResourceType
            | Self::GetETag
            | Self::SyncToken
            | Self::CurrentUserPrivilegeSet => Ns::Dav,
            Self::CalendarHomeSet
            | Self::SupportedCalendarComponents
            | Self::CalendarDescription => Ns::CalDav,
            Self::GetCtag => Ns::CalendarServer,
            Self::CalendarColor => Ns::Apple,
        }
    }

    const fn prefix(self) -> &'static str {
        match self.namespace() {
            Ns::Dav => "D",
            Ns::CalDav => "C",
            Ns::CalendarServer => "CS",
            Ns::Apple => "A",
        }
    }
}

impl PropFindRequest {
    /// Creates an empty PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Body for principal discovery (step 1 of discovery).
    #[must_use]
    pub fn principal() -> Self {
        let mut req = Self::new();
        req.add_property(Prop::CurrentUserPrincipal);
        req
    }

    /// Body for calendar-home-set discovery (step 2 of discovery).
    #[must_use]
    pub fn calendar_home() -> Self {
        let mut req = Self::new();
        req.add_property(Prop::CalendarHomeSet);
        req
    }

    /// Body for the calendar listing (step 3 of discovery).
    #[must_use]
    pub fn calendars() -> Self {
        let mut req = Self::new();
        req.add_property(Prop::DisplayName)
            .add_property(Prop::ResourceType)
            .add_property(Prop::GetETag)
            .add_property(Prop::GetCtag)
            .add_property(Prop::SyncToken)
            .add_property(Prop::SupportedCalendarComponents)
            .add_property(Prop::CalendarColor)
            .add_property(Prop::CalendarDescription)
            .add_property(Prop::CurrentUserPrivilegeSet);
        req
    }

    /// Body requesting only the collection tag.
    #[must_use]
    pub fn ctag() -> Self {
        let mut req = Self::new();
        req.add_property(Prop::GetCtag);
        req
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: Prop) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        // <D:propfind xmlns:D="DAV:" ...>
        let mut propfind = BytesStart::new("D:propfind");
        propfind.push_attribute(("xmlns:D", ns::DAV));
        if self.props.iter().any(|p| p.namespace() == Ns::CalDav) {
            propfind.push_attribute(("xmlns:C", ns::CALDAV));
        }
        if self.props.iter().any(|p| p.namespace() == Ns::CalendarServer) {
            propfind.push_attribute(("xmlns:CS", ns::CALENDARSERVER));
        }
        if self.props.iter().any(|p| p.namespace() == Ns::Apple) {
            propfind.push_attribute(("xmlns:A", ns::APPLE));
        }
        writer.write_event(Event::Start(propfind))?;

        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        for prop in &self.props {
            let qualified = format!("{}:{}", prop.prefix(), prop.name());
            writer.write_event(Event::Empty(BytesStart::new(qualified)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        writer.write_event(Event::End(BytesEnd::new("D:propfind")))?;

        into_xml(writer)
    }
}

impl Default for PropFindRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Time range filter for calendar queries, in UTC `YYYYMMDDTHHMMSSZ` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    /// Start date/time (inclusive).
    pub start: String,
    /// End date/time (exclusive).
    pub end: Option<String>,
}

/// Calendar query request builder (REPORT `calendar-query`).
#[derive(Debug)]
pub struct CalendarQueryRequest {
    component: String,
    time_range: Option<TimeRange>,
}

impl CalendarQueryRequest {
    /// Creates a query for VEVENT components.
    #[must_use]
    pub fn events() -> Self {
        Self {
            component: "VEVENT".to_string(),
            time_range: None,
        }
    }

    /// Creates a query for an arbitrary component type.
    #[must_use]
    pub fn component(component: String) -> Self {
        Self {
            component,
            time_range: None,
        }
    }

    /// Restricts the query to a time range.
    #[must_use]
    pub fn time_range(mut self, start: String, end: Option<String>) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    /// Builds the XML body for the calendar query request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        // Lowercase prefixes: Exchange and some sabre deployments 400 on
        // uppercase-prefixed calendar-query bodies.
        let mut query = BytesStart::new("c:calendar-query");
        query.push_attribute(("xmlns:d", ns::DAV));
        query.push_attribute(("xmlns:c", ns::CALDAV));
        writer.write_event(Event::Start(query))?;

        writer.write_event(Event::Start(BytesStart::new("d:prop")))?;
        writer.write_event(Event::Empty(BytesStart::new("d:getetag")))?;
        writer.write_event(Event::Empty(BytesStart::new("c:calendar-data")))?;
        writer.write_event(Event::End(BytesEnd::new("d:prop")))?;

        writer.write_event(Event::Start(BytesStart::new("c:filter")))?;

        let mut outer = BytesStart::new("c:comp-filter");
        outer.push_attribute(("name", "VCALENDAR"));
        writer.write_event(Event::Start(outer))?;

        let mut inner = BytesStart::new("c:comp-filter");
        inner.push_attribute(("name", self.component.as_str()));
        match &self.time_range {
            Some(tr) => {
                writer.write_event(Event::Start(inner))?;
                let mut time_range = BytesStart::new("c:time-range");
                time_range.push_attribute(("start", tr.start.as_str()));
                if let Some(end) = &tr.end {
                    time_range.push_attribute(("end", end.as_str()));
                }
                writer.write_event(Event::Empty(time_range))?;
                writer.write_event(Event::End(BytesEnd::new("c:comp-filter")))?;
            }
            None => writer.write_event(Event::Empty(inner))?,
        }

        writer.write_event(Event::End(BytesEnd::new("c:comp-filter")))?;
        writer.write_event(Event::End(BytesEnd::new("c:filter")))?;
        writer.write_event(Event::End(BytesEnd::new("c:calendar-query")))?;

        into_xml(writer)
    }
}

/// Calendar multiget request builder (REPORT `calendar-multiget`).
#[derive(Debug, Default)]
pub struct CalendarMultiGetRequest {
    hrefs: Vec<String>,
}

impl CalendarMultiGetRequest {
    /// Creates a new calendar multiget request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an href to the request.
    pub fn add_href(&mut self, href: String) -> &mut Self {
        self.hrefs.push(href);
        self
    }

    /// Builds the XML body for the calendar multiget request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut multiget = BytesStart::new("c:calendar-multiget");
        multiget.push_attribute(("xmlns:d", ns::DAV));
        multiget.push_attribute(("xmlns:c", ns::CALDAV));
        writer.write_event(Event::Start(multiget))?;

        writer.write_event(Event::Start(BytesStart::new("d:prop")))?;
        writer.write_event(Event::Empty(BytesStart::new("d:getetag")))?;
        writer.write_event(Event::Empty(BytesStart::new("c:calendar-data")))?;
        writer.write_event(Event::End(BytesEnd::new("d:prop")))?;

        for href in &self.hrefs {
            writer.write_event(Event::Start(BytesStart::new("d:href")))?;
            writer.write_event(Event::Text(BytesText::new(href.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("d:href")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("c:calendar-multiget")))?;

        into_xml(writer)
    }
}

/// RFC 6578 sync-collection request builder.
#[derive(Debug)]
pub struct SyncCollectionRequest {
    sync_token: String,
}

impl SyncCollectionRequest {
    /// Creates a sync-collection request. An empty token requests the
    /// initial (full) synchronization and a fresh token.
    #[must_use]
    pub fn new(sync_token: String) -> Self {
        Self { sync_token }
    }

    /// Builds the XML body for the sync-collection request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut sync = BytesStart::new("D:sync-collection");
        sync.push_attribute(("xmlns:D", ns::DAV));
        sync.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(sync))?;

        if self.sync_token.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new("D:sync-token")))?;
        } else {
            writer.write_event(Event::Start(BytesStart::new("D:sync-token")))?;
            writer.write_event(Event::Text(BytesText::new(self.sync_token.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("D:sync-token")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("D:sync-level")))?;
        writer.write_event(Event::Text(BytesText::new("1")))?;
        writer.write_event(Event::End(BytesEnd::new("D:sync-level")))?;

        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        writer.write_event(Event::Empty(BytesStart::new("D:getetag")))?;
        writer.write_event(Event::Empty(BytesStart::new("C:calendar-data")))?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        writer.write_event(Event::End(BytesEnd::new("D:sync-collection")))?;

        into_xml(writer)
    }
}

/// Free/busy query request builder.
#[derive(Debug)]
pub struct FreeBusyQueryRequest {
    start: String,
    end: String,
}

impl FreeBusyQueryRequest {
    /// Creates a new free/busy query request.
    #[must_use]
    pub fn new(start: String, end: String) -> Self {
        Self { start, end }
    }

    /// Builds the XML body for the free/busy query request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut free_busy = BytesStart::new("C:free-busy-query");
        free_busy.push_attribute(("xmlns:D", ns::DAV));
        free_busy.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(free_busy))?;

        let mut time_range = BytesStart::new("C:time-range");
        time_range.push_attribute(("start", self.start.as_str()));
        time_range.push_attribute(("end", self.end.as_str()));
        writer.write_event(Event::Empty(time_range))?;

        writer.write_event(Event::End(BytesEnd::new("C:free-busy-query")))?;

        into_xml(writer)
    }
}

/// MKCALENDAR request builder.
#[derive(Debug)]
pub struct MkCalendarRequest {
    display_name: String,
    description: Option<String>,
}

impl MkCalendarRequest {
    /// Creates a new MKCALENDAR request.
    #[must_use]
    pub fn new(display_name: String, description: Option<String>) -> Self {
        Self {
            display_name,
            description,
        }
    }

    /// Builds the XML body for the MKCALENDAR request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, DavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut mkcalendar = BytesStart::new("C:mkcalendar");
        mkcalendar.push_attribute(("xmlns:D", ns::DAV));
        mkcalendar.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(mkcalendar))?;

        writer.write_event(Event::Start(BytesStart::new("D:set")))?;
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;

        writer.write_event(Event::Start(BytesStart::new("D:displayname")))?;
        writer.write_event(Event::Text(BytesText::new(self.display_name.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new("D:displayname")))?;

        if let Some(desc) = &self.description {
            writer.write_event(Event::Start(BytesStart::new("C:calendar-description")))?;
            writer.write_event(Event::Text(BytesText::new(desc.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("C:calendar-description")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
        writer.write_event(Event::End(BytesEnd::new("D:set")))?;
        writer.write_event(Event::End(BytesEnd::new("C:mkcalendar")))?;

        into_xml(writer)
    }
}
