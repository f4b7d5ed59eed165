use std::collections::HashMap;
use std::path::Path;

use axum::extract::Multipart;
use bytes::Bytes;

/// Errors raised while decomposing a `multipart/form-data` body.
///
/// All of these are the caller's fault and surface as 400 responses with
/// the offending field named.
#[derive(Debug)]
pub enum MultipartError {
    /// A required field was not present in the form.
    MissingField(String),
    /// A text field could not be parsed to the expected type.
    ParseError { field: String, message: String },
    /// A file exceeds the route's per-file size limit.
    FileTooLarge {
        field: String,
        size: usize,
        limit: usize,
    },
    /// The combined upload exceeds the route's total size limit.
    TotalTooLarge { size: usize, limit: usize },
    /// A file's content type is not in the route's allow list.
    ContentTypeNotAllowed { field: String, content_type: String },
    /// An error from the underlying multipart parser.
    Malformed(String),
}

impl std::fmt::Display for MultipartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "missing required field: {name}"),
            Self::ParseError { field, message } => {
                write!(f, "failed to parse field '{field}': {message}")
            }
            Self::FileTooLarge { field, size, limit } => {
                write!(f, "file '{field}' is {size} bytes, limit is {limit}")
            }
            Self::TotalTooLarge { size, limit } => {
                write!(f, "upload totals {size} bytes, limit is {limit}")
            }
            Self::ContentTypeNotAllowed {
                field,
                content_type,
            } => write!(f, "content type '{content_type}' not allowed for '{field}'"),
            Self::Malformed(msg) => write!(f, "multipart error: {msg}"),
        }
    }
}

impl std::error::Error for MultipartError {}

/// Per-route upload limits and content-type allow list.
#[derive(Debug, Clone, Default)]
pub struct UploadLimits {
    pub max_file_size: Option<usize>,
    pub max_total_size: Option<usize>,
    /// Accepted content types; empty = anything.
    pub allowed_types: Vec<String>,
}

/// A file received from a multipart form upload.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// The field name in the form.
    pub field: String,
    /// The original file name provided by the client, if any.
    pub filename: Option<String>,
    /// The content type (MIME type) of the file, if provided.
    pub content_type: Option<String>,
    /// The raw file data.
    pub data: Bytes,
}

impl FileUpload {
    /// Size of the file data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the upload to disk.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        tokio::fs::write(path, &self.data).await
    }
}

/// All fields of a multipart form, collected and limit-checked.
pub struct MultipartForm {
    /// Text fields, keyed by field name. Multiple values per key are kept.
    pub text: HashMap<String, Vec<String>>,
    /// File fields, keyed by field name. Multiple files per key are kept.
    pub files: HashMap<String, Vec<FileUpload>>,
}

impl MultipartForm {
    /// Drain an axum `Multipart` extractor, enforcing the given limits.
    ///
    /// A part with a filename is a file upload; everything else is a text
    /// field.
    pub async fn collect(
        mut multipart: Multipart,
        limits: &UploadLimits,
    ) -> Result<Self, MultipartError> {
        let mut text: HashMap<String, Vec<String>> = HashMap::new();
        let mut files: HashMap<String, Vec<FileUpload>> = HashMap::new();
        let mut total = 0usize;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| MultipartError::Malformed(e.to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            let filename = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|s| s.to_string());

            let data = field
                .bytes()
                .await
                .map_err(|e| MultipartError::Malformed(e.to_string()))?;

            total += data.len();
            if let Some(limit) = limits.max_total_size {
                if total > limit {
                    return Err(MultipartError::TotalTooLarge { size: total, limit });
                }
            }

            if filename.is_some() {
                if let Some(limit) = limits.max_file_size {
                    if data.len() > limit {
                        return Err(MultipartError::FileTooLarge {
                            field: name,
                            size: data.len(),
                            limit,
                        });
                    }
                }
                if !limits.allowed_types.is_empty() {
                    let ct = content_type.clone().unwrap_or_default();
                    if !limits.allowed_types.iter().any(|a| a == &ct) {
                        return Err(MultipartError::ContentTypeNotAllowed {
                            field: name,
                            content_type: ct,
                        });
                    }
                }
                files.entry(name.clone()).or_default().push(FileUpload {
                    field: name,
                    filename,
                    content_type,
                    data,
                });
            } else {
                let value = String::from_utf8(data.to_vec())
                    .map_err(|e| MultipartError::ParseError {
                        field: name.clone(),
                        message: e.to_string(),
                    })?;
                text.entry(name).or_default().push(value);
            }
        }

        Ok(Self { text, files })
    }
}
