use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::HttpError;
use crate::http::{HeaderMap, Method, Uri};
use crate::web::multipart::{FileUpload, UploadLimits};

/// Where a handler argument comes from in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A `{name}` segment of the URL path.
    Path,
    /// A query-string entry.
    Query,
    /// The parsed request body.
    Body,
    /// The raw transport request (method, uri, headers, client address).
    Request,
    /// A file part of a `multipart/form-data` body.
    MultipartFile,
    /// A text part of a `multipart/form-data` body.
    MultipartField,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Path => "path",
            BindingKind::Query => "query",
            BindingKind::Body => "body",
            BindingKind::Request => "request",
            BindingKind::MultipartFile => "multipart-file",
            BindingKind::MultipartField => "multipart-field",
        }
    }
}

/// String-to-JSON coercion validated against the declared parameter type.
pub(crate) type CoerceFn = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

/// Descriptor for one handler parameter.
#[derive(Clone)]
pub struct ParamBinding {
    pub name: String,
    pub kind: BindingKind,
    pub required: bool,
    /// Short name of the declared Rust type (for the route metadata view).
    pub type_name: &'static str,
    /// Applied when the parameter is absent and not required.
    pub default: Option<Value>,
    pub(crate) coerce: Option<CoerceFn>,
    /// Upload limits, for `MultipartFile` bindings.
    pub(crate) limits: Option<UploadLimits>,
}

impl ParamBinding {
    pub(crate) fn new(name: &str, kind: BindingKind, type_name: &'static str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            type_name,
            default: None,
            coerce: None,
            limits: None,
        }
    }

    /// Shape-only clone for metadata round-trips (drops the coercer).
    pub fn shape(&self) -> (String, BindingKind, &'static str, bool) {
        (self.name.clone(), self.kind, self.type_name, self.required)
    }
}

impl std::fmt::Debug for ParamBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamBinding")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("type", &self.type_name)
            .field("required", &self.required)
            .field("default", &self.default)
            .finish()
    }
}

/// Coerce a raw request string into the JSON representation of `T`.
///
/// Tries the string form first (so `abc` binds to a `String` parameter and
/// UUIDs parse from their textual form), then the literal form (so `42`
/// binds to an integer and `true` to a bool).
pub(crate) fn coerce_scalar<T: DeserializeOwned + Serialize>(raw: &str) -> Result<Value, String> {
    let as_string = Value::String(raw.to_string());
    if serde_json::from_value::<T>(as_string.clone()).is_ok() {
        return Ok(as_string);
    }
    match serde_json::from_str::<T>(raw) {
        Ok(typed) => serde_json::to_value(typed).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

pub(crate) fn scalar_coercer<T: DeserializeOwned + Serialize + 'static>() -> CoerceFn {
    Arc::new(|raw: &str| coerce_scalar::<T>(raw))
}

/// The raw transport request, for handlers that need headers, cookies, or
/// the client address.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestInfo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The bound arguments handed to a handler, keyed by parameter name.
///
/// Values were coerced and validated during binding, so typed access here
/// fails only on a declared-type / accessed-type mismatch in the handler
/// itself.
pub struct Args {
    values: HashMap<String, Value>,
    files: HashMap<String, Vec<FileUpload>>,
    request: Option<RequestInfo>,
    body_param: Option<String>,
}

impl Args {
    pub(crate) fn new() -> Self {
        Self {
            values: HashMap::new(),
            files: HashMap::new(),
            request: None,
            body_param: None,
        }
    }

    pub(crate) fn insert_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub(crate) fn insert_body(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
        self.body_param = Some(name.to_string());
    }

    pub(crate) fn insert_files(&mut self, name: &str, files: Vec<FileUpload>) {
        self.files.insert(name.to_string(), files);
    }

    pub(crate) fn set_request(&mut self, info: RequestInfo) {
        self.request = Some(info);
    }

    /// Typed access to a bound parameter.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, HttpError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| HttpError::internal(format!("no bound parameter '{name}'")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| HttpError::internal(format!("parameter '{name}': {e}")))
    }

    /// Typed access to the request body.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let name = self
            .body_param
            .as_deref()
            .ok_or_else(|| HttpError::internal("route declares no body parameter"))?;
        self.get(name)
    }

    /// The body as a generic JSON document, if one was bound.
    pub fn body_value(&self) -> Option<&Value> {
        self.body_param.as_deref().and_then(|n| self.values.get(n))
    }

    /// The single file bound under `name`.
    pub fn file(&self, name: &str) -> Result<&FileUpload, HttpError> {
        self.files
            .get(name)
            .and_then(|f| f.first())
            .ok_or_else(|| HttpError::internal(format!("no bound file '{name}'")))
    }

    /// All files bound under `name` (empty if none).
    pub fn files(&self, name: &str) -> &[FileUpload] {
        self.files.get(name).map(|f| f.as_slice()).unwrap_or(&[])
    }

    /// The raw transport request, when the route declares it.
    pub fn request(&self) -> Result<&RequestInfo, HttpError> {
        self.request
            .as_ref()
            .ok_or_else(|| HttpError::internal("route declares no request parameter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn coerce_integer() {
        assert_eq!(coerce_scalar::<i64>("42").unwrap(), serde_json::json!(42));
        assert!(coerce_scalar::<i64>("forty-two").is_err());
    }

    #[test]
    fn coerce_bool() {
        assert_eq!(coerce_scalar::<bool>("true").unwrap(), serde_json::json!(true));
        assert!(coerce_scalar::<bool>("yep").is_err());
    }

    #[test]
    fn coerce_string_keeps_raw_form() {
        assert_eq!(
            coerce_scalar::<String>("plain text").unwrap(),
            serde_json::json!("plain text")
        );
        // Even numeric-looking input binds as the raw string.
        assert_eq!(
            coerce_scalar::<String>("42").unwrap(),
            serde_json::json!("42")
        );
    }

    #[test]
    fn coerce_uuid_textual() {
        let id = Uuid::nil().to_string();
        assert_eq!(
            coerce_scalar::<Uuid>(&id).unwrap(),
            serde_json::json!(id)
        );
        assert!(coerce_scalar::<Uuid>("not-a-uuid").is_err());
    }

    #[test]
    fn args_typed_access() {
        let mut args = Args::new();
        args.insert_value("id", serde_json::json!(42));
        args.insert_body("payload", serde_json::json!({"name": "A"}));

        let id: i64 = args.get("id").unwrap();
        assert_eq!(id, 42);

        #[derive(serde::Deserialize)]
        struct Payload {
            name: String,
        }
        let body: Payload = args.body().unwrap();
        assert_eq!(body.name, "A");
        assert!(args.body_value().is_some());
    }

    #[test]
    fn args_missing_parameter_is_internal() {
        let args = Args::new();
        let err = args.get::<i64>("nope").unwrap_err();
        assert!(matches!(err, HttpError::Internal(_)));
    }
}
