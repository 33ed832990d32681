// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by the wire and sync layers.

/// Errors produced by `CalDAV` operations.
///
/// Transport failures surface as [`Network`](DavError::Network) or
/// [`Http`](DavError::Http); precondition failures (HTTP 412 and mismatches
/// detected during reconciliation) as [`Conflict`](DavError::Conflict).
/// [`Logic`](DavError::Logic) marks invalid call sequences that are rejected
/// before any network activity.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DavError {
    /// I/O level failure: timeout, unknown host, connection reset, TLS.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP status outside the success range.
    #[error("HTTP {code}: {message}")]
    Http {
        /// Status code returned by the server.
        code: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Malformed multistatus or request body.
    #[error("parse error: {0}")]
    Parse(String),

    /// HTTP 401; the caller is expected to prompt for credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// `ETag` precondition failed or concurrent modification detected.
    #[error("conflict: {0}")]
    Conflict(String),

    /// iCalendar payload could not be parsed or generated.
    #[error("iCalendar error: {0}")]
    Ical(String),

    /// Retries exhausted or the failure is known to be non-retryable.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Invalid operation sequence, rejected before any network activity.
    #[error("invalid operation: {0}")]
    Logic(String),
}

impl From<reqwest::Error> for DavError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_status() {
            let code = e.status().map_or(0, |s| s.as_u16());
            Self::Http {
                code,
                message: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<quick_xml::Error> for DavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        Self::Parse(format!("IO error: {e}"))
    }
}
