//! Webfetch Core Library
//!
//! This library is an HTTP request-orchestration engine: given a target URI,
//! a method, an optional body, and a reusable [`Session`] of
//! credentials/headers/cookies/proxy settings, it builds one or more wire
//! requests, sends them, and applies a layered set of policies before handing
//! final responses back to the caller:
//!
//! - authentication header injection (Basic / Bearer)
//! - redirect following, with conditional preservation of the Authorization
//!   header and POST-to-GET method downgrade
//! - retry-on-failure with a fixed delay
//! - resumable partial-download continuation via byte-range requests
//! - pagination via RFC-8288 `Link` headers
//!
//! # Architecture
//!
//! - [`session`] - durable cross-request state and HTTP client construction
//! - [`body`] - logical request bodies and their wire encodings
//! - [`engine`] - request building, the transport state machine, link
//!   parsing, and the page orchestrator
//!
//! Parameter parsing and output rendering belong to a host layer (see the
//! `webfetch` binary); this library contains the policy logic only.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod body;
pub mod engine;
pub mod session;

// Re-export commonly used types
pub use body::{Body, FieldValue, FormField, format_dictionary};
pub use engine::{
    DEFAULT_REDIRECT_BUDGET, Operation, Orchestrator, Page, PageBody, RunOutcome, WebError,
    is_redirect_code, is_redirect_to_get, parse_link_header, should_retry,
};
pub use session::{AuthScheme, Credentials, HeaderBag, ProxyConfig, Session, is_content_header};

/// Default User-Agent sent when the session does not override it.
#[must_use]
pub fn default_user_agent() -> String {
    format!("webfetch/{}", env!("CARGO_PKG_VERSION"))
}
