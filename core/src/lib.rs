//! Blocking client for the Drip v2 marketing-automation API.
//!
//! # Overview
//! `DripClient` creates and updates subscribers, records events and applies
//! or removes tags. Each call issues exactly one authenticated HTTPS request
//! and maps the response status to `Ok(())` or an `ApiError`.
//!
//! # Design
//! - Request building (`build_*`) and status checking (`parse_*`) are pure;
//!   only the `Transport` does I/O. `UreqTransport` is the default.
//! - Custom field keys are normalized (`normalize_key`) before they are sent.
//! - `Subscriber` guards its custom fields with a mutex so a shared instance
//!   can be filled from several threads.
//! - Nothing is retried; every failure goes straight back to the caller.

pub mod client;
pub mod config;
pub mod error;
pub mod fields;
pub mod http;
pub mod types;

pub use client::DripClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use fields::{normalize_key, normalized_fields, CustomFields};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use types::Subscriber;
