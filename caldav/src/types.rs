// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::ops::Deref;

use crate::response::DavResponse;

/// Calendar resource href (path or absolute URL).
///
/// A `Href` identifies a resource on a `CalDAV` server, such as
/// `/calendars/user/event1.ics`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Href(String);

impl Href {
    /// Creates a new `Href` from a string.
    #[must_use]
    pub const fn new(href: String) -> Self {
        Self(href)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Href {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Href {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Href {
    fn from(href: String) -> Self {
        Self(href)
    }
}

impl From<&str> for Href {
    fn from(href: &str) -> Self {
        Self(href.to_string())
    }
}

/// Entity tag for optimistic concurrency control.
///
/// The value is stored without surrounding double quotes; quotes are added
/// back only when the tag is rendered into an `If-Match`/`If-None-Match`
/// header. `ETag::normalize(e.if_match_value())` returns `e` for every tag
/// without embedded quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ETag(String);

impl ETag {
    /// Creates an `ETag` from an already-unquoted value.
    #[must_use]
    pub const fn new(etag: String) -> Self {
        Self(etag)
    }

    /// Creates an `ETag` from a wire value, stripping one pair of
    /// surrounding double quotes if present.
    ///
    /// A weak-validator prefix (`W/`) is dropped too: weak tags are not
    /// valid in `If-Match`, and servers that hand them out still accept
    /// the opaque value back.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed);
        Self(unquoted.to_string())
    }

    /// Renders the tag for an `If-Match`/`If-None-Match` header, with
    /// exactly one pair of surrounding double quotes.
    #[must_use]
    pub fn if_match_value(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Returns the unquoted inner value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ETag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ETag {
    fn from(etag: String) -> Self {
        Self(etag)
    }
}

impl From<&str> for ETag {
    fn from(etag: &str) -> Self {
        Self(etag.to_string())
    }
}

/// Reference to a server-side resource: href plus optional `ETag`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventRef {
    /// The href of the resource.
    pub href: Href,
    /// The entity tag, if the server reported one.
    pub etag: Option<ETag>,
}

impl EventRef {
    /// Creates a new `EventRef`.
    #[must_use]
    pub const fn new(href: Href, etag: Option<ETag>) -> Self {
        Self { href, etag }
    }
}

/// Calendar collection metadata.
///
/// Built from discovery responses; mutated only by re-discovery or an
/// explicit refresh.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Calendar {
    /// Absolute URL of the calendar collection.
    pub href: Href,
    /// Display name; falls back to the last path segment.
    pub display_name: String,
    /// The description of the calendar.
    pub description: Option<String>,
    /// Calendar color, normalized to `#RRGGBB` where possible.
    pub color: Option<String>,
    /// Collection tag for cheap change detection.
    pub ctag: Option<String>,
    /// RFC 6578 sync token, if the server advertises one.
    pub sync_token: Option<String>,
    /// Supported component types (VEVENT, VTODO, VJOURNAL).
    pub supported_components: Vec<String>,
    /// Whether the current user lacks write privileges.
    pub read_only: bool,
}

impl Calendar {
    /// Builds a `Calendar` from a parsed multistatus response.
    ///
    /// Returns `None` when the resource type carries no calendar marker:
    /// plain collections, schedule inbox/outbox and notification
    /// collections are rejected here.
    #[must_use]
    pub fn from_dav_response(response: &DavResponse, href: Href) -> Option<Self> {
        let resource_type = response.props.get("resourcetype")?;
        if !resource_type.split_whitespace().any(|t| t == "calendar") {
            return None;
        }

        let display_name = response
            .props
            .get("displayname")
            .filter(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| last_path_segment(&href).to_string());

        let supported_components = response
            .props
            .get("supported-calendar-component-set")
            .map(|s| {
                s.split(',')
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let read_only = response
            .props
            .get("current-user-privilege-set")
            .is_some_and(|p| !p.contains("write"));

        Some(Self {
            href,
            display_name,
            description: response.props.get("calendar-description").cloned(),
            color: response
                .props
                .get("calendar-color")
                .map(|c| normalize_color(c)),
            ctag: response.props.get("getctag").cloned(),
            sync_token: response.props.get("sync-token").cloned(),
            supported_components,
            read_only,
        })
    }

    /// Whether the collection supports a given component type.
    #[must_use]
    pub fn supports_component(&self, component: &str) -> bool {
        self.supported_components.iter().any(|c| c == component)
    }
}

/// Normalizes an Apple `calendar-color` value to `#RRGGBB` where possible.
///
/// iCloud reports colors as `#RRGGBBAA`; the alpha byte is dropped. Values
/// in any other shape are passed through untouched.
fn normalize_color(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 9 && trimmed.starts_with('#') && trimmed[1..].chars().all(|c| c.is_ascii_hexdigit()) {
        trimmed.get(..7).unwrap_or(trimmed).to_string()
    } else {
        trimmed.to_string()
    }
}

fn last_path_segment(href: &str) -> &str {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(href)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_normalize_strips_one_quote_pair() {
        assert_eq!(ETag::normalize("\"abc123\"").as_str(), "abc123");
        assert_eq!(ETag::normalize("abc123").as_str(), "abc123");
        assert_eq!(ETag::normalize("\"\"abc\"\"").as_str(), "\"abc\"");
    }

    #[test]
    fn etag_normalize_drops_weak_prefix() {
        assert_eq!(ETag::normalize("W/\"abc123\"").as_str(), "abc123");
        assert_eq!(ETag::normalize("W/abc123").as_str(), "abc123");
    }

    #[test]
    fn etag_round_trip() {
        let etag = ETag::new("rev-42".to_string());
        assert_eq!(etag.if_match_value(), "\"rev-42\"");
        assert_eq!(ETag::normalize(&etag.if_match_value()), etag);
    }

    #[test]
    fn color_normalization_drops_alpha() {
        assert_eq!(normalize_color("#FF2968FF"), "#FF2968");
        assert_eq!(normalize_color("#FF2968"), "#FF2968");
        assert_eq!(normalize_color("tomato"), "tomato");
    }

    #[test]
    fn last_segment_of_collection_href() {
        assert_eq!(last_path_segment("/cal/personal/"), "personal");
        assert_eq!(last_path_segment("https://h/cal/work"), "work");
    }
}
