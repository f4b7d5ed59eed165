use crate::http::{IntoResponse, Json, Response, StatusCode};

/// Helper to create a JSON error response with the standard
/// `{ "error": message }` body.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

/// Per-request errors, converted to HTTP responses at the pipeline boundary.
///
/// Binding and ingress failures are the caller's fault (400, parameter
/// named). Egress and handler failures are server faults: the response body
/// stays opaque outside the `dev` profile while the full detail goes to the
/// log.
pub enum HttpError {
    /// A handler argument could not be produced from the request.
    Binding { parameter: String, message: String },
    /// The request body failed the declared ingress type.
    IngressValidation { message: String },
    /// The handler's return value failed the declared egress type.
    EgressValidation { message: String },
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
    Custom {
        status: StatusCode,
        body: serde_json::Value,
    },
}

impl HttpError {
    pub fn binding(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        HttpError::Binding {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HttpError::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        HttpError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        HttpError::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        HttpError::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HttpError::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::Binding { .. } | HttpError::IngressValidation { .. } => {
                StatusCode::BAD_REQUEST
            }
            HttpError::EgressValidation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HttpError::Forbidden(_) => StatusCode::FORBIDDEN,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Conflict(_) => StatusCode::CONFLICT,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::Custom { status, .. } => *status,
        }
    }

    /// Build the user-visible response. `expose_details` widens server-side
    /// errors with their real message (development profiles only).
    pub(crate) fn into_response_with(self, expose_details: bool) -> Response {
        match self {
            HttpError::Binding { parameter, message } => {
                let body = serde_json::json!({
                    "error": format!("Invalid request parameter '{parameter}'"),
                    "details": { "parameter": parameter, "message": message },
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            HttpError::IngressValidation { message } => {
                let body = serde_json::json!({
                    "error": "Request body validation failed",
                    "details": { "message": message },
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            HttpError::EgressValidation { message } => {
                if expose_details {
                    let body = serde_json::json!({
                        "error": "Response validation failed",
                        "details": { "message": message },
                    });
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
                } else {
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            }
            HttpError::Internal(message) => {
                if expose_details {
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
                } else {
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            }
            HttpError::Custom { status, body } => (status, Json(body)).into_response(),
            other => error_response(other.status(), other.message()),
        }
    }

    fn message(&self) -> String {
        match self {
            HttpError::Binding { parameter, message } => {
                format!("invalid parameter '{parameter}': {message}")
            }
            HttpError::IngressValidation { message } => message.clone(),
            HttpError::EgressValidation { message } => message.clone(),
            HttpError::NotFound(m)
            | HttpError::Unauthorized(m)
            | HttpError::Forbidden(m)
            | HttpError::BadRequest(m)
            | HttpError::Conflict(m)
            | HttpError::Internal(m) => m.clone(),
            HttpError::Custom { body, .. } => body.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Binding { parameter, message } => {
                write!(f, "Binding error on '{parameter}': {message}")
            }
            HttpError::IngressValidation { message } => {
                write!(f, "Ingress validation failed: {message}")
            }
            HttpError::EgressValidation { message } => {
                write!(f, "Egress validation failed: {message}")
            }
            HttpError::NotFound(m) => write!(f, "Not Found: {m}"),
            HttpError::Unauthorized(m) => write!(f, "Unauthorized: {m}"),
            HttpError::Forbidden(m) => write!(f, "Forbidden: {m}"),
            HttpError::BadRequest(m) => write!(f, "Bad Request: {m}"),
            HttpError::Conflict(m) => write!(f, "Conflict: {m}"),
            HttpError::Internal(m) => write!(f, "Internal Error: {m}"),
            HttpError::Custom { status, body } => write!(f, "Custom Error ({status}): {body}"),
        }
    }
}

impl std::fmt::Debug for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::Internal(err.to_string())
    }
}

impl From<crate::container::ContainerError> for HttpError {
    fn from(err: crate::container::ContainerError) -> Self {
        HttpError::Internal(err.to_string())
    }
}

/// Generate `From<E> for HttpError` implementations mapping error types to
/// a specific variant.
///
/// ```ignore
/// mitsuki_core::map_error! {
///     sqlx::Error => Internal,
///     std::num::ParseIntError => BadRequest,
/// }
/// ```
#[macro_export]
macro_rules! map_error {
    ( $( $err_ty:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$err_ty> for $crate::HttpError {
                fn from(err: $err_ty) -> Self {
                    $crate::HttpError::$variant(err.to_string())
                }
            }
        )*
    };
}

// ── Startup errors ──────────────────────────────────────────────────────────

/// Fatal errors during application assembly; these abort the process.
#[derive(Debug)]
pub enum StartupError {
    Configuration(crate::config::ConfigError),
    Container(crate::container::ContainerError),
    Routing(crate::web::route::RouteError),
    Io(std::io::Error),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Configuration(e) => write!(f, "configuration error: {e}"),
            StartupError::Container(e) => write!(f, "component container error: {e}"),
            StartupError::Routing(e) => write!(f, "routing error: {e}"),
            StartupError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<crate::config::ConfigError> for StartupError {
    fn from(e: crate::config::ConfigError) -> Self {
        StartupError::Configuration(e)
    }
}

impl From<crate::container::ContainerError> for StartupError {
    fn from(e: crate::container::ContainerError) -> Self {
        StartupError::Container(e)
    }
}

impl From<crate::web::route::RouteError> for StartupError {
    fn from(e: crate::web::route::RouteError) -> Self {
        StartupError::Routing(e)
    }
}

impl From<std::io::Error> for StartupError {
    fn from(e: std::io::Error) -> Self {
        StartupError::Io(e)
    }
}
