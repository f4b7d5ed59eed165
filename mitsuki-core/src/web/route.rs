use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::container::{short_type_name, Instance};
use crate::error::HttpError;
use crate::web::binding::{scalar_coercer, Args, BindingKind, ParamBinding};
use crate::web::multipart::UploadLimits;
use crate::web::reply::{IntoReply, Reply};

/// HTTP method symbol for a routed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub(crate) fn filter(&self) -> axum::routing::MethodFilter {
        use axum::routing::MethodFilter;
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported method '{other}'")),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deferred "does this JSON document fit type `T`" check, capturing the
/// route's ingress or egress contract.
#[derive(Clone)]
pub struct ShapeCheck {
    pub type_name: &'static str,
    check: Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
}

impl ShapeCheck {
    pub fn of<T: DeserializeOwned + 'static>() -> Self {
        ShapeCheck {
            type_name: short_type_name::<T>(),
            check: Arc::new(|value: &Value| {
                serde_json::from_value::<T>(value.clone())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }),
        }
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        (self.check)(value)
    }
}

impl fmt::Debug for ShapeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeCheck({})", self.type_name)
    }
}

/// Type-erased route handler: controller instance + bound args → reply.
pub type HandlerFn = Arc<
    dyn Fn(Instance, Args) -> Pin<Box<dyn Future<Output = Result<Reply, HttpError>> + Send>>
        + Send
        + Sync,
>;

/// Fluent declaration of one routed handler on a controller.
///
/// ```ignore
/// RouteSpec::post("/users/{id}")
///     .operation("update_user")
///     .path_param::<i64>("id")
///     .query_param_or::<bool>("notify", false)
///     .body::<UpdateUser>()
///     .produces::<UserView>()
///     .exclude_field("password_hash")
///     .handler(|c: UserController, args| async move { ... })
/// ```
pub struct RouteSpec {
    pub(crate) method: HttpMethod,
    pub(crate) path: String,
    pub(crate) operation: String,
    pub(crate) params: Vec<ParamBinding>,
    pub(crate) ingress: Option<ShapeCheck>,
    pub(crate) egress: Option<ShapeCheck>,
    pub(crate) exclusions: BTreeSet<String>,
    pub(crate) security_tags: Vec<String>,
    pub(crate) summary: Option<String>,
    pub(crate) tag: Option<String>,
    pub(crate) handler: Option<HandlerFn>,
}

impl RouteSpec {
    fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            operation: String::new(),
            params: Vec::new(),
            ingress: None,
            egress: None,
            exclusions: BTreeSet::new(),
            security_tags: Vec::new(),
            summary: None,
            tag: None,
            handler: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// The handler method's name; becomes part of the route identity in
    /// logs and the metadata view.
    pub fn operation(mut self, name: &str) -> Self {
        self.operation = name.to_string();
        self
    }

    /// Bind a `{name}` path segment, coerced to `T`.
    pub fn path_param<T: DeserializeOwned + Serialize + 'static>(mut self, name: &str) -> Self {
        let mut binding = ParamBinding::new(name, BindingKind::Path, short_type_name::<T>());
        binding.coerce = Some(scalar_coercer::<T>());
        self.params.push(binding);
        self
    }

    /// Bind a required query parameter, coerced to `T`.
    pub fn query_param<T: DeserializeOwned + Serialize + 'static>(mut self, name: &str) -> Self {
        let mut binding = ParamBinding::new(name, BindingKind::Query, short_type_name::<T>());
        binding.coerce = Some(scalar_coercer::<T>());
        self.params.push(binding);
        self
    }

    /// Bind an optional query parameter with a default.
    pub fn query_param_or<T: DeserializeOwned + Serialize + 'static>(
        mut self,
        name: &str,
        default: T,
    ) -> Self {
        let mut binding = ParamBinding::new(name, BindingKind::Query, short_type_name::<T>());
        binding.coerce = Some(scalar_coercer::<T>());
        binding.required = false;
        binding.default = serde_json::to_value(default).ok();
        self.params.push(binding);
        self
    }

    /// Bind the request body, validated against `T` at ingress.
    pub fn body<T: DeserializeOwned + 'static>(mut self) -> Self {
        self.params.push(ParamBinding::new(
            "body",
            BindingKind::Body,
            short_type_name::<T>(),
        ));
        self.ingress = Some(ShapeCheck::of::<T>());
        self
    }

    /// Bind the request body as a generic JSON document (no ingress type).
    pub fn raw_body(mut self) -> Self {
        self.params
            .push(ParamBinding::new("body", BindingKind::Body, "Value"));
        self
    }

    /// Pass the raw transport request through to the handler.
    pub fn request_info(mut self) -> Self {
        self.params.push(ParamBinding::new(
            "request",
            BindingKind::Request,
            "RequestInfo",
        ));
        self
    }

    /// Bind a file part of a multipart body, enforcing the given limits.
    pub fn multipart_file(mut self, name: &str, limits: UploadLimits) -> Self {
        let mut binding = ParamBinding::new(name, BindingKind::MultipartFile, "FileUpload");
        binding.limits = Some(limits);
        self.params.push(binding);
        self
    }

    /// Bind an optional file part.
    pub fn multipart_file_optional(mut self, name: &str, limits: UploadLimits) -> Self {
        let mut binding = ParamBinding::new(name, BindingKind::MultipartFile, "FileUpload");
        binding.limits = Some(limits);
        binding.required = false;
        self.params.push(binding);
        self
    }

    /// Bind a text part of a multipart body, coerced to `T`.
    pub fn multipart_field<T: DeserializeOwned + Serialize + 'static>(mut self, name: &str) -> Self {
        let mut binding =
            ParamBinding::new(name, BindingKind::MultipartField, short_type_name::<T>());
        binding.coerce = Some(scalar_coercer::<T>());
        self.params.push(binding);
        self
    }

    /// Bind an optional multipart text part with a default.
    pub fn multipart_field_or<T: DeserializeOwned + Serialize + 'static>(
        mut self,
        name: &str,
        default: T,
    ) -> Self {
        let mut binding =
            ParamBinding::new(name, BindingKind::MultipartField, short_type_name::<T>());
        binding.coerce = Some(scalar_coercer::<T>());
        binding.required = false;
        binding.default = serde_json::to_value(default).ok();
        self.params.push(binding);
        self
    }

    /// Validate the handler's return value against `T` at egress.
    pub fn produces<T: DeserializeOwned + 'static>(mut self) -> Self {
        self.egress = Some(ShapeCheck::of::<T>());
        self
    }

    /// Strip a field key from every nested mapping of the response.
    pub fn exclude_field(mut self, field: &str) -> Self {
        self.exclusions.insert(field.to_string());
        self
    }

    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Opaque security tag, passed through to consumers of the route view.
    pub fn security_tag(mut self, tag: &str) -> Self {
        self.security_tags.push(tag.to_string());
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// Attach the handler closure. `C` is the controller type; the closure
    /// receives a clone of the resolved controller instance and the bound
    /// arguments.
    pub fn handler<C, F, Fut, R>(mut self, handler: F) -> Self
    where
        C: Clone + Send + Sync + 'static,
        F: Fn(C, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoReply + 'static,
    {
        let erased: HandlerFn = Arc::new(
            move |instance: Instance,
                  args: Args|
                  -> Pin<Box<dyn Future<Output = Result<Reply, HttpError>> + Send>> {
                match instance.downcast_ref::<C>().cloned() {
                    Some(controller) => {
                        let fut = handler(controller, args);
                        Box::pin(async move { fut.await.into_reply() })
                    }
                    None => Box::pin(async move {
                        Err(HttpError::internal(format!(
                            "handler expected controller `{}`",
                            std::any::type_name::<C>()
                        )))
                    }),
                }
            },
        );
        self.handler = Some(erased);
        self
    }
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("operation", &self.operation)
            .field("params", &self.params)
            .finish()
    }
}

// ── Route table ─────────────────────────────────────────────────────────────

/// Errors found while materializing the route table.
#[derive(Debug)]
pub enum RouteError {
    /// Two routes share (method, path pattern).
    Conflict { method: HttpMethod, pattern: String },
    /// A placeholder name appears twice in one pattern.
    DuplicatePlaceholder { pattern: String, name: String },
    /// Placeholders and path bindings don't line up one-to-one.
    PlaceholderMismatch { pattern: String, detail: String },
    /// A route spec has no handler attached.
    MissingHandler { operation: String, pattern: String },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Conflict { method, pattern } => {
                write!(f, "conflicting routes for {method} {pattern}")
            }
            RouteError::DuplicatePlaceholder { pattern, name } => {
                write!(f, "placeholder '{{{name}}}' appears twice in {pattern}")
            }
            RouteError::PlaceholderMismatch { pattern, detail } => {
                write!(f, "placeholder/binding mismatch in {pattern}: {detail}")
            }
            RouteError::MissingHandler { operation, pattern } => {
                write!(f, "route {pattern} ({operation}) has no handler")
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// A fully resolved routed handler: controller base joined with the method
/// suffix, bindings validated against the pattern's placeholders.
pub struct RouteDescriptor {
    pub method: HttpMethod,
    pub path_pattern: String,
    /// Descriptor name of the owning controller in the container.
    pub controller: String,
    pub handler_name: String,
    pub params: Vec<ParamBinding>,
    pub ingress: Option<ShapeCheck>,
    pub egress: Option<ShapeCheck>,
    pub egress_exclusions: BTreeSet<String>,
    pub security_tags: Vec<String>,
    pub summary: Option<String>,
    pub tag: Option<String>,
    pub(crate) handler: HandlerFn,
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}.{}", self.method, self.path_pattern, self.controller, self.handler_name)
    }
}

/// Extract `{name}` placeholders from a path pattern, in order.
pub(crate) fn placeholders(pattern: &str) -> Vec<&str> {
    pattern
        .split('/')
        .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
        .collect()
}

fn join_paths(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_start_matches('/');
    match (base.is_empty(), suffix.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{suffix}"),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{suffix}"),
    }
}

/// The immutable routing table, materialized once after the container
/// freezes and read-only thereafter.
pub struct RouteTable {
    routes: Vec<Arc<RouteDescriptor>>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.iter()).finish()
    }
}

impl RouteTable {
    /// Validate and assemble routes collected from active controllers.
    ///
    /// Each entry pairs the controller's descriptor name with its base path
    /// and declared route specs.
    pub fn build(
        controllers: Vec<(String, &'static str, Vec<RouteSpec>)>,
    ) -> Result<Self, RouteError> {
        let mut routes = Vec::new();
        let mut seen: HashSet<(HttpMethod, String)> = HashSet::new();

        for (controller, base, specs) in controllers {
            for spec in specs {
                let pattern = join_paths(base, &spec.path);

                let names = placeholders(&pattern);
                let mut unique = HashSet::new();
                for name in &names {
                    if !unique.insert(*name) {
                        return Err(RouteError::DuplicatePlaceholder {
                            pattern: pattern.clone(),
                            name: name.to_string(),
                        });
                    }
                }

                // Each placeholder needs exactly one path binding, and each
                // path binding needs a placeholder.
                for name in &names {
                    let count = spec
                        .params
                        .iter()
                        .filter(|p| p.kind == BindingKind::Path && p.name == *name)
                        .count();
                    if count != 1 {
                        return Err(RouteError::PlaceholderMismatch {
                            pattern: pattern.clone(),
                            detail: format!(
                                "placeholder '{{{name}}}' has {count} path bindings"
                            ),
                        });
                    }
                }
                for param in spec.params.iter().filter(|p| p.kind == BindingKind::Path) {
                    if !names.contains(&param.name.as_str()) {
                        return Err(RouteError::PlaceholderMismatch {
                            pattern: pattern.clone(),
                            detail: format!(
                                "path binding '{}' has no '{{{}}}' placeholder",
                                param.name, param.name
                            ),
                        });
                    }
                }

                if !seen.insert((spec.method, pattern.clone())) {
                    return Err(RouteError::Conflict {
                        method: spec.method,
                        pattern,
                    });
                }

                let handler = spec.handler.ok_or_else(|| RouteError::MissingHandler {
                    operation: spec.operation.clone(),
                    pattern: pattern.clone(),
                })?;

                routes.push(Arc::new(RouteDescriptor {
                    method: spec.method,
                    path_pattern: pattern,
                    controller: controller.clone(),
                    handler_name: spec.operation,
                    params: spec.params,
                    ingress: spec.ingress,
                    egress: spec.egress,
                    egress_exclusions: spec.exclusions,
                    security_tags: spec.security_tags,
                    summary: spec.summary,
                    tag: spec.tag,
                    handler,
                }));
            }
        }

        Ok(RouteTable { routes })
    }

    pub fn routes(&self) -> &[Arc<RouteDescriptor>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Ctl;

    fn noop(path: &str, method: HttpMethod) -> RouteSpec {
        let spec = match method {
            HttpMethod::Get => RouteSpec::get(path),
            HttpMethod::Post => RouteSpec::post(path),
            HttpMethod::Put => RouteSpec::put(path),
            HttpMethod::Patch => RouteSpec::patch(path),
            HttpMethod::Delete => RouteSpec::delete(path),
        };
        spec.operation("noop")
            .handler(|_: Ctl, _args| async move { Reply::no_content() })
    }

    #[test]
    fn base_and_suffix_join() {
        assert_eq!(join_paths("/api/users", "{id}"), "/api/users/{id}");
        assert_eq!(join_paths("/api/users", "/"), "/api/users");
        assert_eq!(join_paths("", "/health"), "/health");
        assert_eq!(join_paths("", ""), "/");
    }

    #[test]
    fn placeholder_extraction() {
        assert_eq!(placeholders("/api/{a}/x/{b}"), vec!["a", "b"]);
        assert!(placeholders("/plain/path").is_empty());
    }

    #[test]
    fn conflict_detected() {
        let specs = vec![
            noop("/users", HttpMethod::Get),
            noop("/users", HttpMethod::Get),
        ];
        let err = RouteTable::build(vec![("C".into(), "/api", specs)]).unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
    }

    #[test]
    fn same_pattern_different_methods_ok() {
        let specs = vec![
            noop("/users", HttpMethod::Get),
            noop("/users", HttpMethod::Post),
        ];
        let table = RouteTable::build(vec![("C".into(), "/api", specs)]).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn placeholder_without_binding_rejected() {
        let spec = RouteSpec::get("/users/{id}")
            .operation("get")
            .handler(|_: Ctl, _args| async move { Reply::no_content() });
        let err = RouteTable::build(vec![("C".into(), "", vec![spec])]).unwrap_err();
        assert!(matches!(err, RouteError::PlaceholderMismatch { .. }));
    }

    #[test]
    fn binding_without_placeholder_rejected() {
        let spec = RouteSpec::get("/users")
            .operation("get")
            .path_param::<i64>("id")
            .handler(|_: Ctl, _args| async move { Reply::no_content() });
        let err = RouteTable::build(vec![("C".into(), "", vec![spec])]).unwrap_err();
        assert!(matches!(err, RouteError::PlaceholderMismatch { .. }));
    }

    #[test]
    fn duplicate_placeholder_rejected() {
        let spec = RouteSpec::get("/x/{id}/y/{id}")
            .operation("get")
            .path_param::<i64>("id")
            .handler(|_: Ctl, _args| async move { Reply::no_content() });
        let err = RouteTable::build(vec![("C".into(), "", vec![spec])]).unwrap_err();
        assert!(matches!(err, RouteError::DuplicatePlaceholder { .. }));
    }

    #[test]
    fn missing_handler_rejected() {
        let spec = RouteSpec::get("/users").operation("list");
        let err = RouteTable::build(vec![("C".into(), "", vec![spec])]).unwrap_err();
        assert!(matches!(err, RouteError::MissingHandler { .. }));
    }

    #[test]
    fn valid_route_resolves_pattern() {
        let spec = RouteSpec::post("/users/{id}")
            .operation("update")
            .path_param::<i64>("id")
            .handler(|_: Ctl, _args| async move { Reply::no_content() });
        let table = RouteTable::build(vec![("UserController".into(), "/api", vec![spec])]).unwrap();
        let route = &table.routes()[0];
        assert_eq!(route.path_pattern, "/api/users/{id}");
        assert_eq!(route.controller, "UserController");
        assert_eq!(route.handler_name, "update");
    }
}
