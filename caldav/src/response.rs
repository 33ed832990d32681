// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Permissive multistatus parser for WebDAV/CalDAV 207 responses.
//!
//! Servers disagree wildly about namespace prefixes (`D:`, `d:`, `c:`,
//! none at all) and about element case, so everything here matches on
//! lowercased local names only. DTDs, processing instructions and external
//! entities are never resolved; `quick_xml` surfaces them as events that
//! are simply skipped, so no input can make the parser perform I/O or
//! expand beyond its input size.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};

use crate::error::DavError;
use crate::types::{ETag, Href};

/// One parsed `<response>` element.
#[derive(Debug, Clone)]
pub struct DavResponse {
    /// The href of the resource, trimmed.
    pub href: Href,
    /// Status parsed from the first `HTTP/x.y <code>` line; 200 when the
    /// response carries no status element.
    pub status: u16,
    /// Raw property text keyed by lowercased local name.
    pub props: BTreeMap<String, String>,
    /// `getetag` value with surrounding quotes stripped.
    pub etag: Option<ETag>,
    /// `calendar-data` content with CDATA unwrapped and XML entities
    /// decoded.
    pub calendar_data: Option<String>,
}

impl DavResponse {
    /// Looks up a property by lowercased local name.
    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }

    /// Whether the per-resource status is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Parsed WebDAV multistatus response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatus {
    /// Per-resource responses, in document order.
    pub responses: Vec<DavResponse>,
    /// Top-level RFC 6578 sync token, if present.
    pub sync_token: Option<String>,
}

impl MultiStatus {
    /// Parses a 207 body.
    ///
    /// Responses without a recoverable href are dropped silently; an error
    /// is returned only for fundamentally malformed XML.
    ///
    /// # Errors
    ///
    /// Returns [`DavError::Parse`] when the document cannot be decoded at
    /// all.
    pub fn parse(xml: &str) -> Result<Self, DavError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);
        // Mismatched end-tag prefixes exist in the wild; local names are
        // checked manually instead.
        reader.config_mut().check_end_names = false;

        let mut responses = Vec::new();
        let mut sync_token = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(ref e) => match local_name(e).as_slice() {
                    b"response" => {
                        if let Some(response) = parse_response(&mut reader)? {
                            responses.push(response);
                        }
                    }
                    b"sync-token" => {
                        let token = read_text(&mut reader, b"sync-token")?;
                        sync_token = Some(token.trim().to_string());
                    }
                    _ => {}
                },
                // DocType, PI, comments, declarations: ignored as if absent.
                _ => {}
            }
            buf.clear();
        }

        Ok(Self {
            responses,
            sync_token,
        })
    }

    /// First successful response carrying the named property.
    #[must_use]
    pub fn find_prop(&self, name: &str) -> Option<&str> {
        self.responses
            .iter()
            .filter(|r| r.is_success())
            .find_map(|r| r.prop(name))
            .filter(|v| !v.is_empty())
    }
}

fn local_name(e: &BytesStart<'_>) -> Vec<u8> {
    e.name().local_name().into_inner().to_ascii_lowercase()
}

fn end_local_name(e: &quick_xml::events::BytesEnd<'_>) -> Vec<u8> {
    e.name().local_name().into_inner().to_ascii_lowercase()
}

/// Decodes a plain text node (no entity references; those arrive as
/// separate [`Event::GeneralRef`] events).
fn text_of(t: &BytesText<'_>) -> String {
    t.decode()
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned())
}

/// Resolves a character or general entity reference, falling back to the
/// raw `&name;` form when the input uses entities we do not define.
/// Undefined entities must not fail the whole document.
fn ref_of(r: &quick_xml::events::BytesRef<'_>) -> String {
    if let Ok(Some(ch)) = r.resolve_char_ref() {
        return ch.to_string();
    }
    if let Ok(name) = r.decode() {
        if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name) {
            return resolved.to_string();
        }
    }
    format!("&{};", String::from_utf8_lossy(r.as_ref()))
}

/// Accumulates the text content (including CDATA sections) of the current
/// element, up to its matching end tag.
fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String, DavError> {
    let mut text = String::new();
    let mut depth = 0u32;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(ref e) => {
                if depth == 0 && end_local_name(e) == end {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(ref t) => text.push_str(&text_of(t)),
            Event::CData(cdata) => text.push_str(&String::from_utf8_lossy(&cdata.into_inner())),
            Event::GeneralRef(ref r) => text.push_str(&ref_of(r)),
            Event::Eof => return Err(DavError::Parse("unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Scans a container element and returns the text of the first inner
/// `<href>`, used for `current-user-principal` and `calendar-home-set`.
fn read_inner_href(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<Option<String>, DavError> {
    let mut href = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(ref e) if end_local_name(e) == end => break,
            Event::Start(ref e) if local_name(e).as_slice() == b"href" => {
                let text = read_text(reader, b"href")?;
                if href.is_none() {
                    href = Some(text.trim().to_string());
                }
            }
            Event::Eof => return Err(DavError::Parse("unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(href)
}

/// Scans a container element and returns the local names of all nested
/// elements, used for `resourcetype` and `current-user-privilege-set`.
fn read_child_names(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<Vec<String>, DavError> {
    let mut names = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(ref e) if end_local_name(e) == end => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                names.push(String::from_utf8_lossy(&local_name(e)).into_owned());
            }
            Event::Eof => return Err(DavError::Parse("unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(names)
}

/// Reads `comp name="..."` attributes out of a
/// `supported-calendar-component-set` element.
fn read_components(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<Vec<String>, DavError> {
    let mut components = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(ref e) if end_local_name(e) == end => break,
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e).as_slice() == b"comp" =>
            {
                if let Ok(Some(attr)) = e.try_get_attribute("name") {
                    components.push(String::from_utf8_lossy(&attr.value).into_owned());
                }
            }
            Event::Eof => return Err(DavError::Parse("unexpected EOF".to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(components)
}

fn parse_status_line(s: &str) -> Option<u16> {
    let s = s.trim();
    if !s.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("http/")) {
        return None;
    }
    s.split_whitespace().nth(1)?.parse().ok()
}

fn parse_response(reader: &mut Reader<&[u8]>) -> Result<Option<DavResponse>, DavError> {
    let mut href: Option<String> = None;
    let mut status: Option<u16> = None;
    let mut props = BTreeMap::new();
    let mut etag = None;
    let mut calendar_data = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(ref e) if end_local_name(e) == b"response" => break,
            Event::Eof => return Err(DavError::Parse("unexpected EOF".to_string())),
            Event::Start(ref e) => match local_name(e).as_slice() {
                b"href" => {
                    let text = read_text(reader, b"href")?;
                    if href.is_none() {
                        href = Some(text.trim().to_string());
                    }
                }
                b"status" => {
                    let text = read_text(reader, b"status")?;
                    if let Some(parsed) = parse_status_line(&text) {
                        // Responses mixing 200 and 404 propstats (missing
                        // props) count as success regardless of ordering.
                        match status {
                            None => status = Some(parsed),
                            Some(existing)
                                if !(200..300).contains(&existing)
                                    && (200..300).contains(&parsed) =>
                            {
                                status = Some(parsed);
                            }
                            Some(_) => {}
                        }
                    }
                }
                b"prop" => {
                    parse_prop(reader, &mut props, &mut etag, &mut calendar_data)?;
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(href.filter(|h| !h.is_empty()).map(|h| DavResponse {
        href: Href::new(h),
        status: status.unwrap_or(200),
        props,
        etag,
        calendar_data,
    }))
}

fn parse_prop(
    reader: &mut Reader<&[u8]>,
    props: &mut BTreeMap<String, String>,
    etag: &mut Option<ETag>,
    calendar_data: &mut Option<String>,
) -> Result<(), DavError> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(ref e) if end_local_name(e) == b"prop" => break,
            Event::Eof => return Err(DavError::Parse("unexpected EOF".to_string())),
            Event::Empty(ref e) => {
                let name = String::from_utf8_lossy(&local_name(e)).into_owned();
                props.entry(name).or_default();
            }
            Event::Start(ref e) => {
                let local = local_name(e);
                let name = String::from_utf8_lossy(&local).into_owned();
                match local.as_slice() {
                    b"getetag" => {
                        let text = read_text(reader, b"getetag")?;
                        let normalized = ETag::normalize(&text);
                        props.insert(name, normalized.as_str().to_string());
                        *etag = Some(normalized);
                    }
                    b"calendar-data" => {
                        let text = read_text(reader, b"calendar-data")?;
                        *calendar_data = Some(text.clone());
                        props.insert(name, text);
                    }
                    b"current-user-principal" | b"calendar-home-set" => {
                        if let Some(inner) = read_inner_href(reader, &local)? {
                            props.insert(name, inner);
                        } else {
                            props.entry(name).or_default();
                        }
                    }
                    b"resourcetype" | b"current-user-privilege-set" => {
                        let children = read_child_names(reader, &local)?;
                        props.insert(name, children.join(" "));
                    }
                    b"supported-calendar-component-set" => {
                        let components = read_components(reader, &local)?;
                        props.insert(name, components.join(","));
                    }
                    _ => {
                        let text = read_text(reader, &local)?;
                        props.insert(name, text.trim().to_string());
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

