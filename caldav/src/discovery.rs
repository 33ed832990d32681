// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Account discovery: the three-step principal walk of RFC 4791/3744.

use crate::error::DavError;
use crate::http::{Depth, HttpClient};
use crate::request::PropFindRequest;
use crate::response::MultiStatus;
use crate::types::{Calendar, Href};

/// Result of the discovery walk.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    /// Resolved `current-user-principal` URL.
    pub principal_url: String,
    /// Resolved `calendar-home-set` URL.
    pub calendar_home_url: String,
    /// Usable calendar collections under the home set, after quirk
    /// filtering.
    pub calendars: Vec<Calendar>,
}

/// Walks server root → principal → calendar home → calendar list.
///
/// Each step is a PROPFIND (depth 0 for the first two, depth 1 for the
/// listing). The first error is surfaced verbatim.
pub(crate) async fn discover(
    http: &HttpClient,
    base_url: &str,
) -> Result<DiscoveryResult, DavError> {
    let principal_url = {
        let body = PropFindRequest::principal().build()?;
        let resp = http.propfind(base_url, Depth::Zero, body).await?;
        let multistatus = MultiStatus::parse(&resp.body)?;
        let href = multistatus
            .find_prop("current-user-principal")
            .ok_or_else(|| {
                DavError::Parse("server did not report current-user-principal".to_string())
            })?;
        resolve_href(base_url, href)?
    };
    tracing::debug!(%principal_url, "discovered principal");

    let calendar_home_url = {
        let body = PropFindRequest::calendar_home().build()?;
        let resp = http.propfind(&principal_url, Depth::Zero, body).await?;
        let multistatus = MultiStatus::parse(&resp.body)?;
        let href = multistatus.find_prop("calendar-home-set").ok_or_else(|| {
            DavError::Parse("principal did not report calendar-home-set".to_string())
        })?;
        resolve_href(base_url, href)?
    };
    tracing::debug!(%calendar_home_url, "discovered calendar home");

    let body = PropFindRequest::calendars().build()?;
    let resp = http.propfind(&calendar_home_url, Depth::One, body).await?;
    let multistatus = MultiStatus::parse(&resp.body)?;

    let home_path = url_path(&calendar_home_url);
    let quirks = http.quirks();
    let mut calendars = Vec::new();
    for response in &multistatus.responses {
        let absolute = resolve_href(base_url, &response.href)?;
        // The home collection lists itself at depth 1.
        if trim_slash(&url_path(&absolute)) == trim_slash(&home_path) {
            continue;
        }
        let Some(calendar) = Calendar::from_dav_response(response, Href::new(absolute)) else {
            continue;
        };
        if quirks.skip_calendar(&calendar) {
            tracing::debug!(href = %calendar.href, quirks = quirks.name(), "skipping collection");
            continue;
        }
        calendars.push(calendar);
    }

    Ok(DiscoveryResult {
        principal_url,
        calendar_home_url,
        calendars,
    })
}

/// Resolves an href against the original server's scheme and host.
pub(crate) fn resolve_href(base_url: &str, href: &str) -> Result<String, DavError> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(href.to_string());
    }
    let base = reqwest::Url::parse(base_url)
        .map_err(|e| DavError::Parse(format!("invalid base URL {base_url}: {e}")))?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| DavError::Parse(format!("unresolvable href {href}: {e}")))
}

fn url_path(url: &str) -> String {
    reqwest::Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string())
}

fn trim_slash(path: &str) -> &str {
    path.trim_end_matches('/')
}
