//! The request engine: building, sending, and orchestrating wire requests.
//!
//! # Layers
//!
//! - [`builder`] - URI preparation, header routing, and body filling
//! - [`executor`] - the send/redirect/retry/resume state machine
//! - link parsing - RFC-8288 `Link` headers ([`parse_link_header`])
//! - [`Orchestrator`] - the page loop and response dispatch
//! - [`WebError`] - the failure taxonomy
//!
//! Hosts normally interact with [`Orchestrator`] only; the lower layers are
//! exposed for callers that drive single exchanges themselves.

pub mod builder;
mod error;
pub mod executor;
mod links;
mod orchestrator;

pub use builder::{EncodedBody, WireRequest, build_request, fill_request, prepare_uri};
pub use error::WebError;
pub use executor::{
    DEFAULT_REDIRECT_BUDGET, ResumeState, content_range_total, is_redirect_code,
    is_redirect_to_get, should_retry,
};
pub use links::parse_link_header;
pub use orchestrator::{Operation, Orchestrator, Page, PageBody, RunOutcome};
