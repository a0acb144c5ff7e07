//! The top-level driver: one logical operation, possibly expanded into
//! several pages via `Link`-header pagination.
//!
//! The orchestrator builds a request, fills its body, executes it through
//! the transport state machine, applies the HTTP-status failure policy, and
//! dispatches each page (buffered in memory, or streamed to the output
//! file). When link-following is enabled it repeats against the `next`
//! relation with an empty body until the relation disappears or the follow
//! cap is reached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::{Method, Response, StatusCode};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::body::{Body, FormField};
use crate::session::Session;

use super::builder::{build_request, fill_request, prepare_uri};
use super::error::WebError;
use super::executor::{Executor, ResumeState, content_range_total};
use super::links::parse_link_header;

/// Configuration for one logical operation.
///
/// Mutated during the run: the method can be downgraded to GET by a
/// redirect, a GET dictionary body is consumed into the query string, and
/// followed pages clear the body.
#[derive(Debug, Clone)]
pub struct Operation {
    pub method: Method,
    pub body: Option<Body>,
    /// Explicit multipart form fields; takes precedence over `body`.
    pub form: Option<Vec<FormField>>,
    pub content_type: Option<String>,
    pub transfer_encoding: Option<String>,
    /// Response bodies are streamed here instead of being buffered.
    pub out_file: Option<PathBuf>,
    /// Continue a partial download of `out_file` via byte-range requests.
    pub resume: bool,
    /// Follow the `next` relation of RFC-8288 `Link` headers.
    pub follow_rel_link: bool,
    /// Maximum number of *followed* pages (the first page is always
    /// fetched).
    pub maximum_follow_rel_link: u32,
    /// Parse `Link` headers onto each page without following them.
    pub parse_rel_link: bool,
    /// Keep the Authorization header across redirects; the engine then
    /// follows redirects itself instead of delegating to the client.
    pub preserve_authorization: bool,
    /// Return non-success responses as pages instead of failing.
    pub skip_http_error_check: bool,
    /// Per-operation cancellation signal, honored during sends and retry
    /// delays.
    pub cancel: CancellationToken,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            form: None,
            content_type: None,
            transfer_encoding: None,
            out_file: None,
            resume: false,
            follow_rel_link: false,
            maximum_follow_rel_link: u32::MAX,
            parse_rel_link: false,
            preserve_authorization: false,
            skip_http_error_check: false,
            cancel: CancellationToken::new(),
        }
    }
}

impl Operation {
    /// Validates the operation configuration before any network activity.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::Validation`] for conflicting body sources or a
    /// resume request without an output file.
    pub fn validate(&self) -> Result<(), WebError> {
        if self.body.is_some() && self.form.is_some() {
            return Err(WebError::validation(
                "a body and form fields cannot both be supplied",
            ));
        }
        if self.resume && self.out_file.is_none() {
            return Err(WebError::validation("resume requires an output file"));
        }
        Ok(())
    }
}

/// One dispatched page of a run.
#[derive(Debug)]
pub struct Page {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: PageBody,
    /// Relation links parsed from this page's `Link` headers (empty unless
    /// parsing or following was requested).
    pub links: HashMap<String, String>,
}

/// Where a page's body ended up.
#[derive(Debug)]
pub enum PageBody {
    /// Buffered in memory (no output file configured).
    Buffered(Vec<u8>),
    /// Streamed to the output file.
    Saved { path: PathBuf, bytes: u64 },
    /// Writing was skipped: the resumed download was already complete.
    Skipped,
}

/// The result of a run: one page per followed link, plus any non-fatal
/// per-page errors (currently only redirect-cap reports).
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub pages: Vec<Page>,
    pub errors: Vec<WebError>,
}

#[allow(clippy::expect_used)]
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("<[^>]*>").expect("HTML tag regex is valid") // Static pattern, safe to panic
});

/// Drives one logical operation against a [`Session`].
pub struct Orchestrator {
    session: Session,
    op: Operation,
}

impl Orchestrator {
    /// Creates a driver over a session and an operation configuration.
    #[must_use]
    pub fn new(session: Session, op: Operation) -> Self {
        Self { session, op }
    }

    /// The session, for inspection between runs.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the session for reconfiguration between runs.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// A handle to the operation's cancellation signal.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.op.cancel.clone()
    }

    /// Recovers the session (and its cookie state) after the driver is done.
    #[must_use]
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Runs the operation against `uri` and returns the dispatched pages.
    ///
    /// # Errors
    ///
    /// Configuration problems surface before any network activity;
    /// transport errors and non-success HTTP statuses (unless skipped)
    /// terminate the run. Redirect-cap reports are collected per page in
    /// the outcome instead.
    #[instrument(skip(self), fields(uri = %uri))]
    pub async fn run(&mut self, uri: &str) -> Result<RunOutcome, WebError> {
        self.op.validate()?;
        let mut url = prepare_uri(uri, &mut self.op)?;
        self.session.prepare(&url)?;

        // Manual redirect handling is only needed when there is an
        // Authorization header to carry across hops. The primary client then
        // has auto-redirect disabled so every hop passes back through the
        // executor.
        let preserve_authorization =
            self.op.preserve_authorization && self.session.headers.contains("Authorization");

        let client = self.session.build_client(preserve_authorization)?;
        let mut resume = ResumeState::new(self.op.resume);
        let mut outcome = RunOutcome::default();
        let mut followed: u32 = 0;

        loop {
            if followed > 0 {
                debug!(url = %url, "following rel link");
            }

            let mut request = build_request(&url, &mut self.session, &self.op, &mut resume)?;
            fill_request(&mut request, &self.op, &mut self.session).await?;
            debug!(
                method = %request.method,
                url = %request.url,
                content_length = request.content_length.unwrap_or(0),
                "sending request"
            );

            let mut executor = Executor {
                session: &mut self.session,
                op: &mut self.op,
                resume: &mut resume,
            };
            let response = executor
                .execute(&client, request, preserve_authorization)
                .await?;

            let status = response.status();
            let headers = response.headers().clone();
            debug!(status = status.as_u16(), "response received");

            let links = if self.op.follow_rel_link || self.op.parse_rel_link {
                parse_link_header(&headers, &url)
            } else {
                HashMap::new()
            };

            let mut success = status.is_success();
            let mut skip_out_file = false;
            // A range-not-satisfiable answer whose declared total matches
            // the local file means the download already completed.
            if resume.enabled
                && status == StatusCode::RANGE_NOT_SATISFIABLE
                && content_range_total(&headers) == Some(resume.local_size)
            {
                success = true;
                skip_out_file = true;
                info!("output file already complete; skipping write");
            }

            let redirect_blocked =
                self.session.maximum_redirection == 0 && matches!(status.as_u16(), 301 | 302);

            if redirect_blocked {
                warn!(
                    status = status.as_u16(),
                    url = %url,
                    "redirect received while the maximum redirection count is 0"
                );
                outcome
                    .errors
                    .push(WebError::redirect_limit_exceeded(url.as_str()));
            } else if !self.op.skip_http_error_check && !success {
                let reason = status.canonical_reason().unwrap_or_default().to_string();
                let detail = extract_detail(response).await;
                return Err(WebError::http_status(
                    status.as_u16(),
                    reason,
                    detail,
                    url.as_str(),
                ));
            }

            let body = self.dispatch(response, skip_out_file, &resume).await?;
            outcome.pages.push(Page {
                status,
                headers,
                body,
                links: links.clone(),
            });

            if !self.op.follow_rel_link {
                break;
            }
            let Some(next) = links.get("next") else {
                break;
            };
            if followed >= self.op.maximum_follow_rel_link {
                break;
            }
            url = Url::parse(next).map_err(|_| WebError::invalid_url(next.clone()))?;
            followed += 1;
            // Followed pages carry no body.
            self.op.body = None;
            self.op.form = None;
        }

        Ok(outcome)
    }

    async fn dispatch(
        &self,
        response: Response,
        skip_out_file: bool,
        resume: &ResumeState,
    ) -> Result<PageBody, WebError> {
        if skip_out_file {
            return Ok(PageBody::Skipped);
        }
        if let Some(path) = &self.op.out_file {
            let append = resume.enabled && resume.succeeded;
            write_to_file(response, path, append).await
        } else {
            let url = response.url().clone();
            let bytes = response
                .bytes()
                .await
                .map_err(|source| WebError::network(url.as_str(), source))?;
            Ok(PageBody::Buffered(bytes.to_vec()))
        }
    }
}

/// Streams a response body into the output file.
///
/// Append mode (a successfully resumed download) seeks to the end first;
/// otherwise the file is created or truncated, and a partial file left by a
/// mid-stream failure is removed.
async fn write_to_file(response: Response, path: &Path, append: bool) -> Result<PageBody, WebError> {
    let url = response.url().clone();
    let mut file = if append {
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| WebError::io(path, source))?;
        handle
            .seek(std::io::SeekFrom::End(0))
            .await
            .map_err(|source| WebError::io(path, source))?;
        handle
    } else {
        tokio::fs::File::create(path)
            .await
            .map_err(|source| WebError::io(path, source))?
    };

    let result = stream_to_file(&mut file, response, &url, path).await;
    if result.is_err() && !append {
        debug!(path = %path.display(), "cleaning up partial file after error");
        let _ = tokio::fs::remove_file(path).await;
    }
    let bytes = result?;

    info!(path = %path.display(), bytes, appended = append, "response body written");
    Ok(PageBody::Saved {
        path: path.to_path_buf(),
        bytes,
    })
}

async fn stream_to_file(
    file: &mut tokio::fs::File,
    response: Response,
    url: &Url,
    path: &Path,
) -> Result<u64, WebError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| WebError::network(url.as_str(), source))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|source| WebError::io(path, source))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|source| WebError::io(path, source))?;

    Ok(bytes_written)
}

/// Best-effort extraction of a human-readable detail message from an error
/// response body, with HTML tags stripped. Failure to extract returns
/// `None` and never masks the primary error.
async fn extract_detail(response: Response) -> Option<String> {
    let text = response.text().await.ok()?;
    let stripped = HTML_TAG.replace_all(&text, "");
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
