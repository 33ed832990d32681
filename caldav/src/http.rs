// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! WebDAV transport: authenticated requests with manual redirect
//! handling, bounded retries and a response size cap.
//!
//! Redirects are followed by hand because automatic followers strip the
//! `Authorization` header when the host changes, which breaks iCloud's
//! partition redirects (`caldav.icloud.com` to `pNN-caldav.icloud.com`).

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};

use crate::config::CalDavConfig;
use crate::error::DavError;
use crate::quirks::{ServerQuirks, quirks_for};
use crate::types::ETag;

/// Maximum number of redirect hops followed after the initial request.
const MAX_REDIRECTS: u32 = 5;

/// Maximum retries after the initial attempt.
const MAX_RETRIES: u32 = 2;

/// First retry delay; doubles per attempt up to [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_millis(2000);

/// Wait applied for a 429 without a usable `Retry-After` value.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Response bodies larger than this fail with a network error.
const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Content type for XML request bodies.
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Content type for event PUT bodies.
pub const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

/// WebDAV `Depth` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource itself.
    Zero,
    /// The resource and its direct children.
    One,
    /// The whole subtree.
    Infinity,
}

impl Depth {
    /// Header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        }
    }
}

/// Conditional-request mode for PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional request.
    None,
    /// `If-None-Match: *` — create only, fail on an existing resource.
    IfNoneMatchAny,
    /// `If-Match: "<etag>"` — update only an unchanged resource.
    IfMatch(ETag),
}

/// Fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Final status code after redirects.
    pub status: u16,
    /// Normalized (unquoted) `ETag` header, if present.
    pub etag: Option<ETag>,
    /// Selected response headers needed by callers (`Last-Modified`,
    /// `Cache-Control`, `Expires`), keyed by lowercased name.
    pub headers: Vec<(String, String)>,
    /// Body, capped at 10 MiB.
    pub body: String,
}

impl RawResponse {
    /// Looks up a retained response header by lowercased name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client for `CalDAV` operations.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    config: CalDavConfig,
    quirks: &'static dyn ServerQuirks,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: CalDavConfig) -> Result<Self, DavError> {
        let client = reqwest::Client::builder()
            // Manual redirects; see module docs.
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            // Reads default to the long timeout; write methods override
            // it per request in `send_once`.
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;
        let quirks = quirks_for(&config.base_url);
        Ok(Self {
            client,
            config,
            quirks,
        })
    }

    /// Behavioral overrides selected for the configured server.
    #[must_use]
    pub fn quirks(&self) -> &'static dyn ServerQuirks {
        self.quirks
    }

    /// Executes a PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures or non-207/200 statuses.
    pub async fn propfind(
        &self,
        url: &str,
        depth: Depth,
        body: String,
    ) -> Result<RawResponse, DavError> {
        let resp = self
            .execute(
                dav_method("PROPFIND")?,
                url,
                Some(depth),
                Some(XML_CONTENT_TYPE),
                &Precondition::None,
                &[],
                Some(body),
            )
            .await?;
        expect_multistatus(resp)
    }

    /// Executes a REPORT request.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures or non-207/200 statuses.
    pub async fn report(
        &self,
        url: &str,
        depth: Depth,
        body: String,
    ) -> Result<RawResponse, DavError> {
        let resp = self
            .execute(
                dav_method("REPORT")?,
                url,
                Some(depth),
                Some(XML_CONTENT_TYPE),
                &Precondition::None,
                &[],
                Some(body),
            )
            .await?;
        expect_multistatus(resp)
    }

    /// Executes a GET request, returning the response for any status.
    ///
    /// Callers translate the status: the conflict resolver needs raw 404s
    /// and the subscription fetcher raw 304s.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures only.
    pub async fn get(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
    ) -> Result<RawResponse, DavError> {
        self.execute(
            Method::GET,
            url,
            None,
            None,
            &Precondition::None,
            extra_headers,
            None,
        )
        .await
    }

    /// Executes a PUT with the given precondition.
    ///
    /// # Errors
    ///
    /// 412 surfaces as [`DavError::Conflict`]; other error statuses as
    /// their typed variants.
    pub async fn put(
        &self,
        url: &str,
        body: String,
        precondition: Precondition,
    ) -> Result<RawResponse, DavError> {
        let resp = self
            .execute(
                Method::PUT,
                url,
                None,
                Some(ICS_CONTENT_TYPE),
                &precondition,
                &[],
                Some(body),
            )
            .await?;
        match resp.status {
            200..=299 => Ok(resp),
            412 => Err(DavError::Conflict(match precondition {
                Precondition::IfNoneMatchAny => "resource already exists".to_string(),
                _ => "ETag conflict".to_string(),
            })),
            status => Err(status_error(status, &resp.body)),
        }
    }

    /// Executes a DELETE, optionally guarded by `If-Match`.
    ///
    /// A 404 is success: the resource is already gone.
    ///
    /// # Errors
    ///
    /// 412 surfaces as [`DavError::Conflict`]; other error statuses as
    /// their typed variants.
    pub async fn delete(&self, url: &str, etag: Option<&ETag>) -> Result<(), DavError> {
        let precondition = match etag {
            Some(etag) => Precondition::IfMatch(etag.clone()),
            None => Precondition::None,
        };
        let resp = self
            .execute(Method::DELETE, url, None, None, &precondition, &[], None)
            .await?;
        match resp.status {
            200..=299 | 404 => Ok(()),
            412 => Err(DavError::Conflict("ETag conflict on delete".to_string())),
            status => Err(status_error(status, &resp.body)),
        }
    }

    /// Executes a MKCALENDAR request.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures or non-2xx statuses.
    pub async fn mkcalendar(&self, url: &str, body: String) -> Result<(), DavError> {
        let resp = self
            .execute(
                dav_method("MKCALENDAR")?,
                url,
                None,
                Some(XML_CONTENT_TYPE),
                &Precondition::None,
                &[],
                Some(body),
            )
            .await?;
        match resp.status {
            200..=299 => Ok(()),
            status => Err(status_error(status, &resp.body)),
        }
    }

    /// Sends the request with retries, following redirects manually.
    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        method: Method,
        url: &str,
        depth: Option<Depth>,
        content_type: Option<&'static str>,
        precondition: &Precondition,
        extra_headers: &[(String, String)],
        body: Option<String>,
    ) -> Result<RawResponse, DavError> {
        let mut attempt = 0u32;
        loop {
            let sent = self
                .send_following_redirects(
                    &method,
                    url,
                    depth,
                    content_type,
                    precondition,
                    extra_headers,
                    body.as_deref(),
                )
                .await;

            match sent {
                Err(e) => {
                    let text = error_text(&e);
                    if is_fatal_tls(&text) {
                        return Err(DavError::Network(format!("TLS failure: {text}")));
                    }
                    if is_retryable_io(&e, &text) && attempt < MAX_RETRIES {
                        tracing::debug!(attempt, error = %text, "retrying after IO error");
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(DavError::Network(text));
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status == StatusCode::TOO_MANY_REQUESTS.as_u16() && attempt < MAX_RETRIES {
                        let delay = retry_after_delay(
                            resp.headers()
                                .get(RETRY_AFTER)
                                .and_then(|v| v.to_str().ok()),
                        );
                        tracing::debug!(attempt, ?delay, "throttled, honoring Retry-After");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    if status >= 500 && attempt < MAX_RETRIES {
                        tracing::debug!(attempt, status, "retrying after server error");
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return read_response(resp).await;
                }
            }
        }
    }

    /// One request plus up to [`MAX_REDIRECTS`] manual hops. The auth
    /// header is re-applied on every hop; a chain longer than the limit
    /// surfaces the last 3xx response unchanged.
    #[allow(clippy::too_many_arguments)]
    async fn send_following_redirects(
        &self,
        method: &Method,
        url: &str,
        depth: Option<Depth>,
        content_type: Option<&'static str>,
        precondition: &Precondition,
        extra_headers: &[(String, String)],
        body: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut current = url.to_string();
        let mut hops = 0u32;
        loop {
            let resp = self
                .send_once(
                    method,
                    &current,
                    depth,
                    content_type,
                    precondition,
                    extra_headers,
                    body,
                )
                .await?;

            let status = resp.status().as_u16();
            if !matches!(status, 301 | 302 | 303 | 307 | 308) || hops >= MAX_REDIRECTS {
                return Ok(resp);
            }

            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let Some(location) = location else {
                return Ok(resp);
            };
            let Some(next) = resolve_location(&current, &location) else {
                return Ok(resp);
            };
            tracing::debug!(from = %current, to = %next, "following redirect");
            current = next;
            hops += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        depth: Option<Depth>,
        content_type: Option<&'static str>,
        precondition: &Precondition,
        extra_headers: &[(String, String)],
        body: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut req = self.client.request(method.clone(), url);
        req = self.config.auth.apply(req);

        if is_write_method(method) {
            req = req.timeout(Duration::from_secs(self.config.write_timeout_secs));
        }
        if let Some(depth) = depth {
            req = req.header("Depth", depth.as_str());
        }
        if let Some(content_type) = content_type {
            req = req.header(CONTENT_TYPE, content_type);
        }
        match precondition {
            Precondition::None => {}
            Precondition::IfNoneMatchAny => {
                req = req.header(reqwest::header::IF_NONE_MATCH, "*");
            }
            Precondition::IfMatch(etag) => {
                req = req.header(reqwest::header::IF_MATCH, etag.if_match_value());
            }
        }
        for (name, value) in self.quirks.extra_headers() {
            req = req.header(*name, *value);
        }
        for (name, value) in extra_headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            req = req.body(body.to_string());
        }

        req.send().await
    }
}

/// Write methods get the shorter write timeout instead of the long read
/// timeout.
fn is_write_method(method: &Method) -> bool {
    matches!(method.as_str(), "PUT" | "DELETE" | "MKCALENDAR")
}

/// Maps an error status to the typed error. 401 is authentication, 412 is
/// a conflict, everything else carries the code and a body snippet.
pub(crate) fn status_error(status: u16, body: &str) -> DavError {
    match status {
        401 => DavError::Auth("server returned 401 Unauthorized".to_string()),
        412 => DavError::Conflict("precondition failed".to_string()),
        _ => DavError::Http {
            code: status,
            message: snippet(body),
        },
    }
}

fn expect_multistatus(resp: RawResponse) -> Result<RawResponse, DavError> {
    match resp.status {
        200 | 207 => Ok(resp),
        status => Err(status_error(status, &resp.body)),
    }
}

fn snippet(body: &str) -> String {
    const LIMIT: usize = 2048;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let mut end = LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.get(..end).unwrap_or_default().to_string()
    }
}

fn dav_method(name: &'static str) -> Result<Method, DavError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| DavError::Network(format!("invalid method {name}: {e}")))
}

fn resolve_location(current: &str, location: &str) -> Option<String> {
    let base = reqwest::Url::parse(current).ok()?;
    let resolved = base.join(location).ok()?;
    Some(resolved.to_string())
}

/// Reads the body with the 10 MiB cap and extracts the headers callers
/// care about.
async fn read_response(resp: reqwest::Response) -> Result<RawResponse, DavError> {
    let status = resp.status().as_u16();
    let etag = resp
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(ETag::normalize);

    let mut headers = Vec::new();
    for name in ["last-modified", "cache-control", "expires", "location"] {
        if let Some(value) = resp.headers().get(name).and_then(|v| v.to_str().ok()) {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let mut resp = resp;
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if bytes.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(DavError::Network(
                "response body exceeds 10 MiB limit".to_string(),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(RawResponse {
        status,
        etag,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

fn backoff_delay(attempt: u32) -> Duration {
    let delay = INITIAL_BACKOFF.saturating_mul(1 << attempt.min(8));
    delay.min(MAX_BACKOFF)
}

/// `Retry-After: 0`, a missing header and garbage all fall back to the
/// default wait; a positive value is taken literally, in seconds.
fn retry_after_delay(header: Option<&str>) -> Duration {
    match header.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => DEFAULT_RETRY_AFTER,
    }
}

fn error_text(e: &reqwest::Error) -> String {
    use std::error::Error as _;

    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text.to_ascii_lowercase()
}

fn is_fatal_tls(text: &str) -> bool {
    text.contains("tls") || text.contains("certificate") || text.contains("handshake")
}

fn is_retryable_io(e: &reqwest::Error, text: &str) -> bool {
    e.is_timeout()
        || e.is_connect()
        || text.contains("reset")
        || text.contains("connection")
        || text.contains("unknown host")
        || text.contains("dns error")
}
