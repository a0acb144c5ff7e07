//! The transport executor: the send/redirect/retry/resume control loop
//! around a single logical operation.
//!
//! One logical operation may issue several wire requests. The loop sends the
//! current request and then checks, in order: redirect (when the operation
//! preserves the Authorization header across hops and follows redirects
//! itself), stale-resume repair (416 with a mismatched length), and retry
//! (failure statuses with a configured retry count). The ordering is
//! load-bearing: a redirect response must never be treated as retryable, and
//! a stale-resume 416 must be repaired before the retry logic could
//! misclassify it as a retryable server error.

use reqwest::header::{CONTENT_RANGE, HeaderMap, LOCATION};
use reqwest::{Client, Method, Response, StatusCode};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use crate::session::Session;

use super::builder::{EncodedBody, WireRequest, build_request, fill_request};
use super::error::WebError;
use super::orchestrator::Operation;

/// Redirect hops followed per operation when no explicit cap is configured.
pub const DEFAULT_REDIRECT_BUDGET: u32 = 50;

/// Resume bookkeeping for one logical operation.
#[derive(Debug, Clone, Copy)]
pub struct ResumeState {
    /// Resume mode is active. Cleared for the rest of the operation when a
    /// stale partial file is detected.
    pub enabled: bool,
    /// The last response was 206 Partial Content.
    pub succeeded: bool,
    /// Size of the pre-existing partial output file at request-build time.
    pub local_size: u64,
}

impl ResumeState {
    /// Creates the state for an operation with resume on or off.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            succeeded: false,
            local_size: 0,
        }
    }

    /// State for an operation without resume.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false)
    }
}

/// Returns true for the redirect statuses the executor follows itself.
///
/// | Status | Name |
/// |--------|------|
/// | 300 | Multiple Choices |
/// | 301 | Moved Permanently |
/// | 302 | Found |
/// | 303 | See Other |
/// | 307 | Temporary Redirect |
#[must_use]
pub fn is_redirect_code(status: StatusCode) -> bool {
    let code = status.as_u16();
    (300..304).contains(&code) || code == 307
}

/// Returns true for redirect statuses that downgrade a POST to GET on the
/// next hop. 307 is redirect-eligible but never changes the method.
#[must_use]
pub fn is_redirect_to_get(status: StatusCode) -> bool {
    (300..304).contains(&status.as_u16())
}

/// Returns true when the status is retry-eligible and retries are
/// configured: 304, or anything in [400, 599], with a positive retry count.
#[must_use]
pub fn should_retry(status: StatusCode, maximum_retry_count: u32) -> bool {
    let code = status.as_u16();
    (code == 304 || (400..=599).contains(&code)) && maximum_retry_count > 0
}

/// Parses the declared total length out of a `Content-Range` header
/// (`bytes 0-99/1234` or `bytes */1234`). `None` when absent or `*`.
#[must_use]
pub fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let total = value.rsplit('/').next()?.trim();
    total.parse().ok()
}

/// The transport state machine for one logical operation.
///
/// Borrows the operation's mutable state: the session (redirect counter,
/// rerouted headers), the operation config (the method can be downgraded to
/// GET mid-operation), and the resume bookkeeping.
pub(crate) struct Executor<'a> {
    pub session: &'a mut Session,
    pub op: &'a mut Operation,
    pub resume: &'a mut ResumeState,
}

impl Executor<'_> {
    /// Runs the control loop and returns the final response.
    ///
    /// `preserve_authorization` selects manual redirect handling: each hop
    /// is re-sent through a client with auto-redirect disabled so the
    /// session headers (Authorization included) are re-applied.
    ///
    /// # Errors
    ///
    /// Transport-level failures ([`WebError::Network`], [`WebError::Timeout`])
    /// terminate the operation without retry; [`WebError::Cancelled`] when
    /// the operation's cancellation signal fires during a send or the retry
    /// delay.
    #[instrument(skip(self, client, request), fields(url = %request.url, method = %request.method))]
    pub async fn execute(
        &mut self,
        client: &Client,
        request: WireRequest,
        preserve_authorization: bool,
    ) -> Result<Response, WebError> {
        // Add 1 to account for the first request.
        let mut attempts_left = self.session.maximum_retry_count + 1;
        let mut redirect_budget = match u32::try_from(self.session.maximum_redirection) {
            Ok(explicit) => explicit,
            Err(_) => DEFAULT_REDIRECT_BUDGET,
        };
        let mut active_client = client.clone();
        let mut current = request;

        loop {
            // Track the URI used by this attempt for rebuilds below.
            let current_url = current.url.clone();
            let response = self.send(&active_client, current).await?;
            let status = response.status();

            // Redirect check, evaluated first.
            if preserve_authorization && is_redirect_code(status) {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    if redirect_budget == 0 {
                        // Budget spent: surface the raw redirect response.
                        return Ok(response);
                    }
                    redirect_budget -= 1;

                    // An explicit positive cap is consumed per hop.
                    if self.session.maximum_redirection > 0 {
                        self.session.maximum_redirection -= 1;
                    }
                    // Selected redirects that used POST must switch to GET
                    // for the redirected location.
                    if self.op.method == Method::POST && is_redirect_to_get(status) {
                        self.op.method = Method::GET;
                    }

                    let target = current_url
                        .join(&location)
                        .map_err(|_| WebError::invalid_url(location.clone()))?;
                    debug!(status = status.as_u16(), target = %target, "following redirect");

                    active_client = self.session.build_client(true)?;
                    // The hop request is rebuilt but not refilled: only
                    // retries and resume repair re-encode the body.
                    current = build_request(&target, self.session, self.op, self.resume)?;
                    attempts_left = self.session.maximum_retry_count + 1;
                    continue;
                }
            }

            // Request again without the Range header when the server said
            // the range was not satisfiable and the declared total differs
            // from the local file: the local partial is larger than (or
            // stale relative to) the remote resource.
            if self.resume.enabled && status == StatusCode::RANGE_NOT_SATISFIABLE {
                if let Some(total) = content_range_total(response.headers()) {
                    if total != self.resume.local_size {
                        info!("resume range not satisfiable; restarting without a range");
                        self.resume.enabled = false;
                        current = self.rebuild(&current_url).await?;
                        attempts_left = self.session.maximum_retry_count + 1;
                        continue;
                    }
                }
            }

            self.resume.succeeded = status == StatusCode::PARTIAL_CONTENT;

            // When no retry count is configured, attempts_left started at 1.
            if attempts_left > 1 && should_retry(status, self.session.maximum_retry_count) {
                debug!(
                    status = status.as_u16(),
                    interval_secs = self.session.retry_interval.as_secs_f64(),
                    "retrying after failure status"
                );
                self.sleep_before_retry().await?;
                current = self.rebuild(&current_url).await?;
                attempts_left -= 1;
                continue;
            }

            return Ok(response);
        }
    }

    /// Builds and fills a fresh request; redirects and retries never reuse a
    /// previously sent one.
    async fn rebuild(&mut self, url: &url::Url) -> Result<WireRequest, WebError> {
        let mut request = build_request(url, self.session, self.op, self.resume)?;
        fill_request(&mut request, self.op, self.session).await?;
        Ok(request)
    }

    async fn send(&self, client: &Client, request: WireRequest) -> Result<Response, WebError> {
        let url = request.url.clone();
        let builder = request_builder(client, request).await?;
        tokio::select! {
            () = self.op.cancel.cancelled() => Err(WebError::Cancelled),
            result = builder.send() => result.map_err(|source| {
                if source.is_timeout() {
                    WebError::timeout(url.as_str())
                } else {
                    WebError::network(url.as_str(), source)
                }
            }),
        }
    }

    async fn sleep_before_retry(&self) -> Result<(), WebError> {
        tokio::select! {
            () = self.op.cancel.cancelled() => Err(WebError::Cancelled),
            () = tokio::time::sleep(self.session.retry_interval) => Ok(()),
        }
    }
}

/// Converts a [`WireRequest`] into a client-bound request builder, opening
/// file-backed bodies at send time.
async fn request_builder(
    client: &Client,
    request: WireRequest,
) -> Result<reqwest::RequestBuilder, WebError> {
    let mut builder = client
        .request(request.method, request.url)
        .headers(request.headers);
    builder = match request.body {
        EncodedBody::Empty => builder,
        EncodedBody::Bytes(bytes) => builder.body(bytes),
        EncodedBody::File { path, .. } => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|source| WebError::io(&path, source))?;
            builder.body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
        }
        EncodedBody::Multipart(form) => builder.multipart(form),
    };
    Ok(builder)
}
