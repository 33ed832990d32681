// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! High-level `CalDAV` operations built on the transport and builders.

use std::sync::Arc;

use crate::codec::IcalCodec;
use crate::config::CalDavConfig;
use crate::discovery::{self, DiscoveryResult};
use crate::error::DavError;
use crate::event::CalendarEvent;
use crate::http::{Depth, HttpClient, Precondition, status_error};
use crate::quirks::ServerQuirks;
use crate::request::{
    CalendarMultiGetRequest, CalendarQueryRequest, FreeBusyQueryRequest, MkCalendarRequest,
    PropFindRequest, SyncCollectionRequest, TimeRange,
};
use crate::response::MultiStatus;
use crate::types::{ETag, EventRef, Href};

/// `CalDAV` client for accessing and managing calendars on `CalDAV`
/// servers.
///
/// # Example
///
/// ```ignore
/// use davsync_caldav::{AuthMethod, CalDavClient, CalDavConfig};
///
/// # async fn example(codec: std::sync::Arc<dyn davsync_caldav::IcalCodec>) -> Result<(), davsync_caldav::DavError> {
/// let config = CalDavConfig {
///     base_url: "https://caldav.example.com".to_string(),
///     auth: AuthMethod::Basic {
///         username: "user".to_string(),
///         password: "pass".to_string(),
///     },
///     ..Default::default()
/// };
///
/// let client = CalDavClient::new(config, codec)?;
/// let discovered = client.discover().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CalDavClient {
    http: Arc<HttpClient>,
    config: CalDavConfig,
    codec: Arc<dyn IcalCodec>,
}

/// An event fetched from the server: the reported href and `ETag` plus
/// the decoded payload. One resource yields several `RemoteEvent`s when
/// the payload carries recurrence overrides.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    /// The href as reported by the server.
    pub href: String,
    /// The `ETag` reported alongside, unquoted.
    pub etag: Option<ETag>,
    /// The decoded event.
    pub event: CalendarEvent,
}

/// One resource fetched by GET.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// The `ETag` of the resource, unquoted.
    pub etag: Option<ETag>,
    /// All events decoded from the payload.
    pub events: Vec<CalendarEvent>,
    /// The raw ICS payload.
    pub raw: String,
}

/// Changes reported by an RFC 6578 sync-collection REPORT.
#[derive(Debug, Clone, Default)]
pub struct SyncCollectionDelta {
    /// Added or changed resources for which the server inlined data.
    pub added: Vec<RemoteEvent>,
    /// Added or changed hrefs reported without data; fetch them with
    /// [`CalDavClient::fetch_events_by_href`].
    pub added_hrefs: Vec<String>,
    /// Deleted hrefs.
    pub deleted_hrefs: Vec<String>,
    /// The next sync token.
    pub new_sync_token: Option<String>,
}

impl CalDavClient {
    /// Creates a new `CalDAV` client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: CalDavConfig, codec: Arc<dyn IcalCodec>) -> Result<Self, DavError> {
        let http = HttpClient::new(config.clone())?;
        Ok(Self {
            http: Arc::new(http),
            config,
            codec,
        })
    }

    /// The iCalendar codec this client decodes payloads with.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn IcalCodec> {
        &self.codec
    }

    /// Behavioral overrides selected for the configured server.
    #[must_use]
    pub fn quirks(&self) -> &'static dyn ServerQuirks {
        self.http.quirks()
    }

    /// Runs the three-step discovery walk from the configured base URL.
    ///
    /// # Errors
    ///
    /// Surfaces the first failing step verbatim.
    pub async fn discover(&self) -> Result<DiscoveryResult, DavError> {
        discovery::discover(&self.http, &self.config.base_url).await
    }

    /// Reads the collection tag of a calendar.
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails; a server that does not
    /// support `getctag` yields `Ok(None)`.
    pub async fn get_ctag(&self, calendar_url: &str) -> Result<Option<String>, DavError> {
        let body = PropFindRequest::ctag().build()?;
        let resp = self.http.propfind(calendar_url, Depth::Zero, body).await?;
        let multistatus = MultiStatus::parse(&resp.body)?;
        Ok(multistatus.find_prop("getctag").map(str::to_string))
    }

    /// Fetches events with a calendar-query REPORT, optionally restricted
    /// to a time range.
    ///
    /// Resources whose payload the codec rejects are dropped and logged;
    /// one broken event must not fail the whole fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn fetch_events(
        &self,
        calendar_url: &str,
        time_range: Option<TimeRange>,
    ) -> Result<Vec<RemoteEvent>, DavError> {
        let mut query = CalendarQueryRequest::events();
        if let Some(range) = time_range {
            query = query.time_range(range.start, range.end);
        }
        let body = query.build()?;
        let resp = self.http.report(calendar_url, Depth::One, body).await?;
        let multistatus = MultiStatus::parse(&resp.body)?;
        Ok(self.decode_events(&multistatus))
    }

    /// Fetches specific resources with a calendar-multiget REPORT.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn fetch_events_by_href(
        &self,
        calendar_url: &str,
        hrefs: &[String],
    ) -> Result<Vec<RemoteEvent>, DavError> {
        if hrefs.is_empty() {
            return Ok(Vec::new());
        }

        let mut multiget = CalendarMultiGetRequest::new();
        for href in hrefs {
            multiget.add_href(href.clone());
        }
        let body = multiget.build()?;
        let resp = self.http.report(calendar_url, Depth::One, body).await?;
        let multistatus = MultiStatus::parse(&resp.body)?;
        Ok(self.decode_events(&multistatus))
    }

    /// Runs an RFC 6578 sync-collection REPORT.
    ///
    /// An empty `sync_token` asks the server for the initial delta and a
    /// fresh token.
    ///
    /// # Errors
    ///
    /// An invalid or expired token surfaces as [`DavError::Http`] with
    /// the server's status and body; use
    /// [`ServerQuirks::sync_token_invalid`] to classify it.
    pub async fn sync_collection(
        &self,
        calendar_url: &str,
        sync_token: &str,
    ) -> Result<SyncCollectionDelta, DavError> {
        let body = SyncCollectionRequest::new(sync_token.to_string()).build()?;
        let resp = self.http.report(calendar_url, Depth::Zero, body).await?;
        let multistatus = MultiStatus::parse(&resp.body)?;

        let calendar_path = url_path(calendar_url);
        let mut delta = SyncCollectionDelta {
            new_sync_token: multistatus.sync_token.clone(),
            ..SyncCollectionDelta::default()
        };
        for response in &multistatus.responses {
            if trim_slash(&url_path(&response.href)) == trim_slash(&calendar_path) {
                continue;
            }
            if response.status == 404 {
                delta.deleted_hrefs.push(response.href.to_string());
            } else if let Some(data) = &response.calendar_data {
                match self.codec.parse(data) {
                    Ok(parsed) => {
                        for event in parsed.events {
                            delta.added.push(RemoteEvent {
                                href: response.href.to_string(),
                                etag: response.etag.clone(),
                                event,
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(href = %response.href, error = %e, "dropping undecodable event");
                    }
                }
            } else {
                delta.added_hrefs.push(response.href.to_string());
            }
        }
        Ok(delta)
    }

    /// Creates an event at `<calendar_url>/<uid>.ics` with
    /// `If-None-Match: *`, so an existing resource turns into a conflict
    /// instead of being overwritten.
    ///
    /// # Errors
    ///
    /// A pre-existing resource surfaces as [`DavError::Conflict`].
    pub async fn create_event_raw(
        &self,
        calendar_url: &str,
        uid: &str,
        ical_data: String,
    ) -> Result<EventRef, DavError> {
        let url = event_url(calendar_url, uid);
        let resp = self
            .http
            .put(&url, ical_data, Precondition::IfNoneMatchAny)
            .await?;
        Ok(EventRef::new(Href::new(url), resp.etag))
    }

    /// Updates an event in place; with an `ETag` the PUT is guarded by
    /// `If-Match`.
    ///
    /// Returns the new `ETag` when the server reports one.
    ///
    /// # Errors
    ///
    /// An `ETag` mismatch surfaces as [`DavError::Conflict`].
    pub async fn update_event_raw(
        &self,
        url: &str,
        ical_data: String,
        etag: Option<&ETag>,
    ) -> Result<Option<ETag>, DavError> {
        let precondition = match etag {
            Some(etag) => Precondition::IfMatch(etag.clone()),
            None => Precondition::None,
        };
        let resp = self.http.put(url, ical_data, precondition).await?;
        Ok(resp.etag)
    }

    /// Deletes an event, optionally guarded by `If-Match`. Deleting an
    /// already-deleted resource succeeds.
    ///
    /// # Errors
    ///
    /// An `ETag` mismatch surfaces as [`DavError::Conflict`].
    pub async fn delete_event(&self, url: &str, etag: Option<&ETag>) -> Result<(), DavError> {
        self.http.delete(url, etag).await
    }

    /// Fetches one resource by URL. Returns `Ok(None)` on 404.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, other error statuses, or
    /// an undecodable payload.
    pub async fn get_event(&self, url: &str) -> Result<Option<FetchedResource>, DavError> {
        let resp = self.http.get(url, &[]).await?;
        match resp.status {
            200..=299 => {
                let parsed = self.codec.parse(&resp.body)?;
                Ok(Some(FetchedResource {
                    etag: resp.etag,
                    events: parsed.events,
                    raw: resp.body,
                }))
            }
            404 => Ok(None),
            status => Err(status_error(status, &resp.body)),
        }
    }

    /// Creates a calendar collection.
    ///
    /// # Errors
    ///
    /// Returns an error if MKCALENDAR fails.
    pub async fn mkcalendar(
        &self,
        url: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> Result<(), DavError> {
        let body = MkCalendarRequest::new(
            display_name.to_string(),
            description.map(str::to_string),
        )
        .build()?;
        self.http.mkcalendar(url, body).await
    }

    /// Runs a free-busy-query REPORT and returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn free_busy(
        &self,
        calendar_url: &str,
        start: &str,
        end: &str,
    ) -> Result<String, DavError> {
        let body = FreeBusyQueryRequest::new(start.to_string(), end.to_string()).build()?;
        let resp = self.http.report(calendar_url, Depth::Zero, body).await?;
        Ok(resp.body)
    }

    fn decode_events(&self, multistatus: &MultiStatus) -> Vec<RemoteEvent> {
        let mut events = Vec::new();
        for response in &multistatus.responses {
            if !response.is_success() {
                continue;
            }
            let Some(data) = &response.calendar_data else {
                continue;
            };
            match self.codec.parse(data) {
                Ok(parsed) => {
                    for event in parsed.events {
                        events.push(RemoteEvent {
                            href: response.href.to_string(),
                            etag: response.etag.clone(),
                            event,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(href = %response.href, error = %e, "dropping undecodable event");
                }
            }
        }
        events
    }
}

/// Joins a calendar URL and a UID into the canonical resource URL.
fn event_url(calendar_url: &str, uid: &str) -> String {
    format!("{}/{uid}.ics", calendar_url.trim_end_matches('/'))
}

fn url_path(url: &str) -> String {
    reqwest::Url::parse(url).map_or_else(|_| url.to_string(), |u| u.path().to_string())
}

fn trim_slash(path: &str) -> &str {
    path.trim_end_matches('/')
}
