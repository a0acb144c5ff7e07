//! Construction of outgoing RFC-7578 multipart/form-data payloads.
//!
//! Only *construction* is in scope: each form field becomes either a string
//! part or a file part (octet-stream), and a list-valued field expands into
//! one part per element. Field names and file names are emitted quoted in
//! the `Content-Disposition` header, the way browsers and curl do.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;

use crate::engine::WebError;

/// One multipart form field.
#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    pub value: FieldValue,
}

impl FormField {
    /// Creates a text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Text(value.into()),
        }
    }

    /// Creates a file field.
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::File(path.into()),
        }
    }
}

/// The value of a multipart form field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    /// Sent as a file part with an `application/octet-stream` content type
    /// and the file's name in the disposition header.
    File(PathBuf),
    /// Expanded into one part per element. Expansion is not recursive: a
    /// list nested inside an element is flattened to its string form.
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// The string form of a value, used for string parts and for flattening
    /// nested lists (elements joined with a single space).
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::File(path) => path.display().to_string(),
            Self::List(items) => items
                .iter()
                .map(FieldValue::as_text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Builds a multipart form from the supplied fields.
///
/// # Errors
///
/// Returns [`WebError::Io`] when a file-valued field cannot be opened.
pub async fn build_form(fields: &[FormField]) -> Result<Form, WebError> {
    let mut form = Form::new();
    for field in fields {
        match &field.value {
            FieldValue::List(items) => {
                for item in items {
                    form = add_single(form, &field.name, item).await?;
                }
            }
            single => form = add_single(form, &field.name, single).await?,
        }
    }
    Ok(form)
}

/// Adds one part for a non-list value. List values reaching here are nested
/// inside another list and are flattened to their string form.
async fn add_single(form: Form, name: &str, value: &FieldValue) -> Result<Form, WebError> {
    match value {
        FieldValue::File(path) => Ok(form.part(name.to_string(), file_part(path).await?)),
        other => Ok(form.text(name.to_string(), other.as_text())),
    }
}

async fn file_part(path: &Path) -> Result<Part, WebError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| WebError::io(path, source))?;
    let length = file
        .metadata()
        .await
        .map_err(|source| WebError::io(path, source))?
        .len();
    let file_name = path
        .file_name()
        .map_or_else(|| "file".to_string(), |name| name.to_string_lossy().into_owned());

    let part = Part::stream_with_length(reqwest::Body::wrap_stream(ReaderStream::new(file)), length)
        .file_name(file_name)
        .mime_str("application/octet-stream")
        .map_err(|_| WebError::content_type("invalid multipart part content type"))?;
    Ok(part)
}
