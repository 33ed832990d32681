// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Sync level of the `davsync` engine: offline operation queue with
//! coalescing, push with precondition handling, conflict resolution,
//! ctag/sync-token driven pull, and ICS subscription refresh.
//!
//! The wire level lives in `davsync-caldav`; the local event store and
//! the iCalendar codec are the caller's, reached through the traits in
//! [`LocalEventProvider`], [`SyncResultHandler`] and
//! [`davsync_caldav::IcalCodec`].

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::match_bool
)]

mod engine;
mod local;
mod ops;
mod orchestrator;
mod push;
mod queue;
mod report;
mod resolver;
mod state;
mod store;
mod subscription;

/// Re-export of the wire-level crate.
pub use davsync_caldav;

pub use crate::engine::SyncEngine;
pub use crate::local::{LocalEventProvider, SyncCallback, SyncResultHandler};
pub use crate::ops::{OperationKind, OperationStatus, PendingOperation};
pub use crate::orchestrator::SyncOrchestrator;
pub use crate::push::{MAX_RETRIES, PushEngine};
pub use crate::queue::OperationQueue;
pub use crate::report::{
    CombinedSyncResult, ConflictResolution, EventConflict, PushResult, RecordedConflict,
    SyncReport,
};
pub use crate::resolver::{ConflictOutcome, ConflictResolver, ConflictStrategy};
pub use crate::state::SyncState;
pub use crate::store::{MemoryOperationStore, PendingOperationStore};
pub use crate::subscription::{
    SubscriptionCache, SubscriptionFetch, SubscriptionFetcher, SubscriptionInfo,
};
