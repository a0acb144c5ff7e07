//! Request construction: URI preparation, header routing, and body filling.
//!
//! A [`WireRequest`] is ephemeral - one per wire attempt. Retries and
//! redirects never reuse a request; the builder is invoked again and the
//! logical body is re-encoded, so a request is filled exactly once.

use std::path::PathBuf;

use reqwest::Method;
use reqwest::header::{
    CONNECTION, HeaderMap, HeaderName, HeaderValue, RANGE, TRANSFER_ENCODING, USER_AGENT,
};
use tracing::debug;
use url::Url;

use crate::body::{Body, build_form, encode_text, encode_xml, format_dictionary};
use crate::session::{Session, is_content_header};

use super::error::WebError;
use super::executor::ResumeState;
use super::orchestrator::Operation;

/// A fully-headered outgoing request, ready for one wire attempt.
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: EncodedBody,
    /// Encoded byte length, when the encoding has a known length.
    pub content_length: Option<u64>,
}

/// The wire-ready payload of a [`WireRequest`].
pub enum EncodedBody {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed from disk at send time; reopened on every attempt.
    File { path: PathBuf, length: u64 },
    Multipart(reqwest::multipart::Form),
}

impl std::fmt::Debug for EncodedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::File { path, length } => {
                write!(f, "File({}, {length} bytes)", path.display())
            }
            Self::Multipart(_) => write!(f, "Multipart"),
        }
    }
}

/// Resolves the caller-supplied URI string to an absolute URL.
///
/// A bare host/path without a scheme is coerced to `http://` - deliberate
/// leniency, not an error. When the operation carries a dictionary body and
/// the method is GET, the pairs are formatted as a query string, merged into
/// the URL (after any existing query), and the body is cleared for the rest
/// of the operation.
///
/// # Errors
///
/// Returns [`WebError::InvalidUrl`] when the URI cannot be resolved to an
/// absolute URL even after scheme coercion.
pub fn prepare_uri(raw: &str, op: &mut Operation) -> Result<Url, WebError> {
    let mut url = coerce_scheme(raw)?;

    if op.method == Method::GET {
        if let Some(Body::Dictionary(pairs)) = &op.body {
            let formatted = format_dictionary(pairs);
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{formatted}"),
                _ => formatted,
            };
            url.set_query(if merged.is_empty() { None } else { Some(&merged) });
            op.body = None;
        }
    }

    Ok(url)
}

fn coerce_scheme(raw: &str) -> Result<Url, WebError> {
    if raw.trim().is_empty() {
        return Err(WebError::invalid_url(raw));
    }
    match Url::parse(raw) {
        Ok(url) if !url.cannot_be_a_base() => Ok(url),
        // "example.com/x" and "localhost:8080" both land here.
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{raw}")).map_err(|_| WebError::invalid_url(raw))
        }
        Err(_) => Err(WebError::invalid_url(raw)),
    }
}

/// Builds a request against `url` from the session and operation state.
///
/// Session headers are copied onto the request envelope; any session header
/// whose name is in the content-header classification table is rerouted into
/// `session.content_headers` instead (the session is mutated, and the
/// content set is rebuilt from scratch on every build). Transfer-Encoding,
/// User-Agent, Connection, and resume Range policies are applied here.
///
/// # Errors
///
/// Returns [`WebError::Validation`] for header values that cannot be
/// attached under strict validation.
pub fn build_request(
    url: &Url,
    session: &mut Session,
    op: &Operation,
    resume: &mut ResumeState,
) -> Result<WireRequest, WebError> {
    let mut headers = HeaderMap::new();
    let lenient = session.skip_header_validation;

    session.content_headers.clear();
    let session_headers: Vec<(String, String)> = session
        .headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    for (name, value) in session_headers {
        if is_content_header(&name) {
            session.content_headers.insert(name, value);
        } else {
            append_header(&mut headers, &name, &value, lenient)?;
        }
    }

    // Chunked transfer encoding when a custom encoding is declared, either
    // on the operation or among the session headers.
    let declared_encoding = op
        .transfer_encoding
        .clone()
        .or_else(|| session.headers.get("Transfer-Encoding").map(str::to_string));
    if let Some(encoding) = declared_encoding {
        let value = if encoding.is_empty() || encoding.eq_ignore_ascii_case("chunked") {
            "chunked".to_string()
        } else {
            format!("chunked, {encoding}")
        };
        set_header(&mut headers, TRANSFER_ENCODING, &value, lenient)?;
    }

    // On the first build a User-Agent among the session headers wins and
    // overwrites the stored value; afterwards the stored value is
    // authoritative. The header copy above already carried it through.
    let header_user_agent = session.headers.get("User-Agent").map(str::to_string);
    if let Some(user_agent) = header_user_agent {
        session.user_agent = user_agent;
    } else {
        let user_agent = session.user_agent.clone();
        set_header(&mut headers, USER_AGENT, &user_agent, lenient)?;
    }

    if session.disable_keep_alive {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
    }

    // Resume: request from the end of the existing partial file, or the
    // whole resource when none exists (resume mode stays active either way).
    if resume.enabled {
        let existing = op
            .out_file
            .as_deref()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|metadata| metadata.len());
        let range = if let Some(size) = existing {
            resume.local_size = size;
            format!("bytes={size}-")
        } else {
            "bytes=0-".to_string()
        };
        set_header(&mut headers, RANGE, &range, lenient)?;
        debug!(range = %range, "resume range applied");
    }

    Ok(WireRequest {
        method: op.method.clone(),
        url: url.clone(),
        headers,
        body: EncodedBody::Empty,
        content_length: None,
    })
}

/// Encodes the operation's logical body into the request and attaches the
/// accumulated content headers.
///
/// Dispatch precedence: explicit multipart form fields, then the body
/// variant. Choosing a multipart encoding discards previously accumulated
/// content headers, which would conflict with the multipart ones.
///
/// # Errors
///
/// Returns [`WebError::Io`] for unreadable body files and
/// [`WebError::ContentType`] for malformed content types or header values
/// under strict validation.
pub async fn fill_request(
    request: &mut WireRequest,
    op: &Operation,
    session: &mut Session,
) -> Result<(), WebError> {
    let strict = !session.skip_header_validation;

    if let Some(content_type) = &op.content_type {
        session
            .content_headers
            .insert("Content-Type", content_type.clone());
    } else if request.method == Method::POST
        && session
            .content_headers
            .get("Content-Type")
            .is_none_or(str::is_empty)
    {
        session
            .content_headers
            .insert("Content-Type", "application/x-www-form-urlencoded");
    }

    if let Some(fields) = &op.form {
        session.content_headers.clear();
        request.body = EncodedBody::Multipart(build_form(fields).await?);
        request.content_length = None;
    } else if let Some(body) = &op.body {
        match body {
            Body::Dictionary(pairs) => {
                set_text_body(request, format_dictionary(pairs), session, strict)?;
            }
            Body::Xml(document) => set_bytes_body(request, encode_xml(document)),
            Body::File(path) => {
                let length = tokio::fs::metadata(path)
                    .await
                    .map_err(|source| WebError::io(path, source))?
                    .len();
                request.content_length = Some(length);
                request.body = EncodedBody::File {
                    path: path.clone(),
                    length,
                };
            }
            Body::Bytes(bytes) => set_bytes_body(request, bytes.clone()),
            Body::Form(fields) => {
                session.content_headers.clear();
                request.body = EncodedBody::Multipart(build_form(fields).await?);
                request.content_length = None;
            }
            Body::Text(text) => set_text_body(request, text.clone(), session, strict)?,
        }
    }

    // Attach accumulated content headers; blank values are skipped.
    let content_headers: Vec<(String, String)> = session
        .content_headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    for (name, value) in content_headers {
        if value.trim().is_empty() {
            continue;
        }
        attach_content_header(&mut request.headers, &name, &value, strict)?;
    }

    Ok(())
}

fn set_text_body(
    request: &mut WireRequest,
    text: String,
    session: &Session,
    strict: bool,
) -> Result<(), WebError> {
    let content_type = session.content_headers.get("Content-Type");
    let bytes = encode_text(&text, content_type, strict)?;
    set_bytes_body(request, bytes);
    Ok(())
}

fn set_bytes_body(request: &mut WireRequest, bytes: Vec<u8>) {
    request.content_length = Some(bytes.len() as u64);
    request.body = EncodedBody::Bytes(bytes);
}

fn append_header(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    lenient: bool,
) -> Result<(), WebError> {
    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        if lenient {
            return Ok(());
        }
        return Err(WebError::validation(format!("invalid header name: {name}")));
    };
    let Ok(header_value) = HeaderValue::from_str(value) else {
        if lenient {
            return Ok(());
        }
        return Err(WebError::validation(format!(
            "invalid value for header {name}"
        )));
    };
    headers.append(header_name, header_value);
    Ok(())
}

fn set_header(
    headers: &mut HeaderMap,
    name: HeaderName,
    value: &str,
    lenient: bool,
) -> Result<(), WebError> {
    let Ok(header_value) = HeaderValue::from_str(value) else {
        if lenient {
            return Ok(());
        }
        return Err(WebError::validation(format!(
            "invalid value for header {name}"
        )));
    };
    headers.insert(name, header_value);
    Ok(())
}

fn attach_content_header(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    strict: bool,
) -> Result<(), WebError> {
    let parsed = HeaderName::from_bytes(name.as_bytes())
        .ok()
        .zip(HeaderValue::from_str(value).ok());
    match parsed {
        Some((header_name, header_value)) => {
            headers.insert(header_name, header_value);
            Ok(())
        }
        None if strict => Err(WebError::content_type(format!(
            "content header {name} has a malformed value"
        ))),
        None => Ok(()),
    }
}
