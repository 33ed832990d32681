// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Durable records for queued local mutations.

use std::fmt;

/// What a pending operation will do on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OperationKind {
    /// PUT with `If-None-Match: *`.
    Create,
    /// PUT with `If-Match` when an `ETag` is known.
    Update,
    /// DELETE with `If-Match` when an `ETag` is known.
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Lifecycle state of a pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OperationStatus {
    /// Waiting for the next push.
    Pending,
    /// Claimed by a running push loop.
    InProgress,
    /// Last attempt failed; `error_message` says why.
    Failed,
}

/// One queued local mutation.
///
/// At most one operation exists per `event_uid` across the whole queue;
/// coalescing on enqueue maintains that. `event_url` is `None` exactly
/// for CREATE (the URL is minted at push time), and `retry_count` never
/// exceeds [`MAX_RETRIES`](crate::push::MAX_RETRIES) — operations beyond
/// that are flagged permanent.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PendingOperation {
    /// Unique record id.
    pub id: String,
    /// Calendar this mutation belongs to.
    pub calendar_url: String,
    /// UID of the affected event.
    pub event_uid: String,
    /// Server URL of the resource; `None` for CREATE.
    pub event_url: Option<String>,
    /// The mutation to perform.
    pub kind: OperationKind,
    /// Lifecycle state.
    pub status: OperationStatus,
    /// Serialized payload; empty for DELETE.
    pub ical_data: String,
    /// Unquoted `ETag` for the `If-Match` precondition.
    pub etag: Option<String>,
    /// Retries consumed so far.
    pub retry_count: u32,
    /// Earliest time the next attempt may run, epoch milliseconds.
    pub next_retry_at_ms: i64,
    /// Failure description from the last attempt.
    pub error_message: Option<String>,
    /// Creation time, epoch milliseconds.
    pub created_at_ms: i64,
}

impl PendingOperation {
    /// Creates a fresh pending record with a random id.
    #[must_use]
    pub fn new(kind: OperationKind, calendar_url: &str, event_uid: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            calendar_url: calendar_url.to_string(),
            event_uid: event_uid.to_string(),
            event_url: None,
            kind,
            status: OperationStatus::Pending,
            ical_data: String::new(),
            etag: None,
            retry_count: 0,
            next_retry_at_ms: 0,
            error_message: None,
            created_at_ms: now_ms(),
        }
    }

    /// Whether the last failure was a conflict awaiting resolution.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("Conflict"))
    }
}

/// Current time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    jiff::Timestamp::now().as_millisecond()
}
