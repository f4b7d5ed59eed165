use std::any::Any;

use serde::Serialize;
use serde_json::Value;

use crate::error::HttpError;
use crate::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use crate::web::codec::ErasedJson;

/// What a handler hands back to the pipeline.
///
/// The payload is kept unserialized until the pipeline encodes it with the
/// application codec, so egress validation and field exclusion run on the
/// materialized JSON document.
pub(crate) enum ReplyBody {
    Empty,
    /// A typed payload from the handler; subject to egress validation and
    /// field exclusion.
    Payload(Box<dyn ErasedJson>),
    /// A pre-shaped JSON document (framework error bodies).
    Raw(Value),
}

/// Response-shaping wrapper: explicit status, headers, and body.
///
/// Handlers either return a `Reply` built from one of the status factories
/// below, or `Result<Reply, HttpError>`.
pub struct Reply {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: ReplyBody,
}

impl Reply {
    /// 200 with a JSON body.
    pub fn ok(payload: impl Serialize + Any + Send + 'static) -> Self {
        Self::with_payload(StatusCode::OK, payload)
    }

    /// 201 with a JSON body.
    pub fn created(payload: impl Serialize + Any + Send + 'static) -> Self {
        Self::with_payload(StatusCode::CREATED, payload)
    }

    /// 202 with a JSON body.
    pub fn accepted(payload: impl Serialize + Any + Send + 'static) -> Self {
        Self::with_payload(StatusCode::ACCEPTED, payload)
    }

    /// 204, no body.
    pub fn no_content() -> Self {
        Reply {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: ReplyBody::Empty,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error_shaped(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::error_shaped(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::error_shaped(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error_shaped(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::error_shaped(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::error_shaped(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Arbitrary status; attach a body with [`status`](ReplyBuilder::body).
    pub fn status(status: StatusCode) -> ReplyBuilder {
        ReplyBuilder { status }
    }

    /// Attach a response header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    fn with_payload(status: StatusCode, payload: impl Serialize + Any + Send + 'static) -> Self {
        Reply {
            status,
            headers: HeaderMap::new(),
            body: ReplyBody::Payload(Box::new(payload)),
        }
    }

    fn error_shaped(status: StatusCode, message: impl Into<String>) -> Self {
        Reply {
            status,
            headers: HeaderMap::new(),
            body: ReplyBody::Raw(serde_json::json!({ "error": message.into() })),
        }
    }
}

/// Second half of `Reply::status(code)`.
pub struct ReplyBuilder {
    status: StatusCode,
}

impl ReplyBuilder {
    pub fn body(self, payload: impl Serialize + Any + Send + 'static) -> Reply {
        Reply {
            status: self.status,
            headers: HeaderMap::new(),
            body: ReplyBody::Payload(Box::new(payload)),
        }
    }

    pub fn empty(self) -> Reply {
        Reply {
            status: self.status,
            headers: HeaderMap::new(),
            body: ReplyBody::Empty,
        }
    }
}

/// Conversion for handler return values.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HttpError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HttpError> {
        Ok(self)
    }
}

impl<E: Into<HttpError>> IntoReply for Result<Reply, E> {
    fn into_reply(self) -> Result<Reply, HttpError> {
        self.map_err(Into::into)
    }
}
