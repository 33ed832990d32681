// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Read-only ICS subscriptions fetched over plain HTTP.
//!
//! Subscriptions are one-shot conditional GETs: the cache state carries
//! the validators (`ETag`, `Last-Modified`) and the scheduling inputs
//! (`REFRESH-INTERVAL`, `max-age`, `Expires`). There is no background
//! thread; the caller re-invokes [`SubscriptionFetcher::fetch`] when the
//! returned `next_refresh_ms` comes due.

use std::sync::Arc;

use davsync_caldav::{CalDavConfig, CalendarEvent, DavError, HttpClient, IcalCodec};

use crate::ops::now_ms;

/// Default refresh interval when the feed and the response name none.
const DEFAULT_REFRESH_SECS: u64 = 6 * 60 * 60;

/// Floor for the refresh interval; feeds asking for less are clamped up.
const MIN_REFRESH_SECS: u64 = 15 * 60;

/// Cache validators and scheduling inputs from the last fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionCache {
    /// Unquoted response `ETag`.
    pub etag: Option<String>,
    /// Raw `Last-Modified` header.
    pub last_modified: Option<String>,
    /// `Cache-Control: max-age` seconds.
    pub max_age_secs: Option<u64>,
    /// Raw `Expires` header.
    pub expires: Option<String>,
    /// `REFRESH-INTERVAL` from the feed, in seconds.
    pub refresh_interval_secs: Option<u64>,
}

/// Calendar-level metadata extracted from a fetched feed.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionInfo {
    /// `X-WR-CALNAME`.
    pub name: Option<String>,
    /// `X-APPLE-CALENDAR-COLOR`, as published.
    pub color: Option<String>,
    /// `REFRESH-INTERVAL` in seconds, if the feed declares one.
    pub refresh_interval_secs: Option<u64>,
}

/// Outcome of one subscription fetch.
#[derive(Debug, Clone)]
pub enum SubscriptionFetch {
    /// The feed has not changed since the cached validators.
    NotModified {
        /// When to try again, epoch milliseconds.
        next_refresh_ms: i64,
    },
    /// A fresh copy of the feed.
    Updated {
        /// Calendar-level metadata.
        info: SubscriptionInfo,
        /// All events in the feed.
        events: Vec<CalendarEvent>,
        /// Validators and scheduling inputs to persist for the next
        /// fetch.
        cache: SubscriptionCache,
        /// When to refresh next, epoch milliseconds.
        next_refresh_ms: i64,
    },
}

/// One-shot ICS fetcher with HTTP cache validators.
#[derive(Debug)]
pub struct SubscriptionFetcher {
    http: HttpClient,
    codec: Arc<dyn IcalCodec>,
    min_refresh_secs: u64,
    default_refresh_secs: u64,
}

impl SubscriptionFetcher {
    /// Creates a fetcher. The config supplies auth (for protected feeds)
    /// and timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: CalDavConfig, codec: Arc<dyn IcalCodec>) -> Result<Self, DavError> {
        Ok(Self {
            http: HttpClient::new(config)?,
            codec,
            min_refresh_secs: MIN_REFRESH_SECS,
            default_refresh_secs: DEFAULT_REFRESH_SECS,
        })
    }

    /// Overrides the refresh floor. Feeds declaring a shorter
    /// `REFRESH-INTERVAL` are clamped up to this value.
    #[must_use]
    pub fn with_min_refresh_secs(mut self, secs: u64) -> Self {
        self.min_refresh_secs = secs;
        self
    }

    /// Fetches a feed conditionally against the given cache state.
    ///
    /// # Errors
    ///
    /// Transport failures, error statuses, or an undecodable feed.
    pub async fn fetch(
        &self,
        url: &str,
        cache: &SubscriptionCache,
    ) -> Result<SubscriptionFetch, DavError> {
        let mut headers = Vec::new();
        if let Some(etag) = &cache.etag {
            headers.push(("If-None-Match".to_string(), format!("\"{etag}\"")));
        }
        if let Some(last_modified) = &cache.last_modified {
            headers.push(("If-Modified-Since".to_string(), last_modified.clone()));
        }

        let resp = self.http.get(url, &headers).await?;
        match resp.status {
            304 => Ok(SubscriptionFetch::NotModified {
                next_refresh_ms: self.next_refresh_ms(
                    cache.refresh_interval_secs,
                    cache.max_age_secs,
                    cache.expires.as_deref(),
                ),
            }),
            200..=299 => {
                let parsed = self.codec.parse(&resp.body)?;
                let refresh_interval_secs = parsed
                    .properties
                    .get("REFRESH-INTERVAL")
                    .and_then(|v| parse_ical_duration_secs(v));
                let max_age_secs = resp.header("cache-control").and_then(parse_max_age);
                let expires = resp.header("expires").map(str::to_string);

                let info = SubscriptionInfo {
                    name: parsed.properties.get("X-WR-CALNAME").cloned(),
                    color: parsed.properties.get("X-APPLE-CALENDAR-COLOR").cloned(),
                    refresh_interval_secs,
                };
                let next_refresh_ms =
                    self.next_refresh_ms(refresh_interval_secs, max_age_secs, expires.as_deref());
                let cache = SubscriptionCache {
                    etag: resp.etag.as_ref().map(|e| e.as_str().to_string()),
                    last_modified: resp.header("last-modified").map(str::to_string),
                    max_age_secs,
                    expires,
                    refresh_interval_secs,
                };
                tracing::debug!(url, name = ?info.name, events = parsed.events.len(), "subscription updated");
                Ok(SubscriptionFetch::Updated {
                    info,
                    events: parsed.events,
                    cache,
                    next_refresh_ms,
                })
            }
            401 => Err(DavError::Auth(
                "subscription feed returned 401 Unauthorized".to_string(),
            )),
            status => Err(DavError::Http {
                code: status,
                message: format!("subscription fetch failed for {url}"),
            }),
        }
    }

    fn next_refresh_ms(
        &self,
        refresh_interval_secs: Option<u64>,
        max_age_secs: Option<u64>,
        expires: Option<&str>,
    ) -> i64 {
        let now = now_ms();
        let expires_in_secs = expires
            .and_then(parse_http_date_ms)
            .map(|at| u64::try_from(((at - now) / 1000).max(0)).unwrap_or(0));
        let chosen = choose_refresh_secs(
            refresh_interval_secs,
            max_age_secs,
            expires_in_secs,
            self.default_refresh_secs,
            self.min_refresh_secs,
        );
        now.saturating_add(i64::try_from(chosen).unwrap_or(i64::MAX).saturating_mul(1000))
    }
}

/// The first declared interval wins: REFRESH-INTERVAL, then max-age, then
/// Expires, then the default. The result is clamped to the floor.
fn choose_refresh_secs(
    refresh_interval: Option<u64>,
    max_age: Option<u64>,
    expires_in: Option<u64>,
    default_secs: u64,
    min_secs: u64,
) -> u64 {
    refresh_interval
        .or(max_age)
        .or(expires_in)
        .unwrap_or(default_secs)
        .max(min_secs)
}

/// Parses an RFC 5545 DURATION (`P1D`, `PT6H`, `P1W`) into seconds.
fn parse_ical_duration_secs(value: &str) -> Option<u64> {
    let span: jiff::Span = value.trim().parse().ok()?;
    let secs = span
        .total((jiff::Unit::Second, jiff::civil::date(2000, 1, 1)))
        .ok()?;
    if secs > 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(secs as u64)
    } else {
        None
    }
}

/// Extracts `max-age` seconds from a `Cache-Control` header value.
fn parse_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        let directive = directive.trim();
        directive
            .strip_prefix("max-age=")
            .and_then(|secs| secs.parse().ok())
    })
}

/// Parses an HTTP date (`Expires`, RFC 2822 form) into epoch millis.
fn parse_http_date_ms(value: &str) -> Option<i64> {
    static PARSER: jiff::fmt::rfc2822::DateTimeParser = jiff::fmt::rfc2822::DateTimeParser::new();
    PARSER
        .parse_timestamp(value)
        .ok()
        .map(|ts| ts.as_millisecond())
}
