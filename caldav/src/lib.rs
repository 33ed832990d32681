// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CalDAV` wire level: transport, request builders, multistatus parsing,
//! per-server quirks and discovery (RFC 4791, RFC 4918, RFC 6578).

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

mod client;
mod codec;
mod config;
mod discovery;
mod error;
mod event;
mod http;
mod quirks;
mod request;
mod response;
mod types;
mod xml;

pub use crate::client::{CalDavClient, FetchedResource, RemoteEvent, SyncCollectionDelta};
pub use crate::codec::{IcalCodec, ParsedCalendar};
pub use crate::config::{AuthMethod, CalDavConfig};
pub use crate::discovery::DiscoveryResult;
pub use crate::error::DavError;
pub use crate::event::CalendarEvent;
pub use crate::http::{Depth, HttpClient, Precondition, RawResponse};
pub use crate::quirks::{
    FastmailQuirks, GenericQuirks, GoogleQuirks, IcloudQuirks, ServerQuirks, quirks_for,
};
pub use crate::request::{
    CalendarMultiGetRequest, CalendarQueryRequest, FreeBusyQueryRequest, MkCalendarRequest,
    Prop, PropFindRequest, SyncCollectionRequest, TimeRange,
};
pub use crate::response::{DavResponse, MultiStatus};
pub use crate::types::{Calendar, ETag, EventRef, Href};
