use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts, Multipart, Query, RawPathParams};
use serde_json::Value;
use tracing::{debug, error};

use crate::container::Container;
use crate::error::HttpError;
use crate::http::{ConnectInfo, IntoResponse, Json, Request, Response, Router, StatusCode};
use crate::web::binding::{Args, BindingKind, ParamBinding, RequestInfo};
use crate::web::codec::JsonCodec;
use crate::web::multipart::{MultipartError, MultipartForm, UploadLimits};
use crate::web::reply::{Reply, ReplyBody};
use crate::web::route::{RouteDescriptor, RouteTable};

/// Everything a request needs after startup: the frozen container, the
/// application codec, and the error-detail policy.
pub(crate) struct Pipeline {
    pub container: Container,
    pub codec: JsonCodec,
    /// Widen error bodies with server-side detail (dev profile only).
    pub expose_details: bool,
    pub max_body_bytes: usize,
}

/// Materialize the route table into an axum router. Every handler runs the
/// same request lifecycle: match → bind → invoke → shape → write.
pub(crate) fn build_router(table: &RouteTable, pipeline: Arc<Pipeline>) -> Router {
    let mut router = Router::new();
    for route in table.routes() {
        let route = route.clone();
        let pipeline = pipeline.clone();
        let path_pattern = route.path_pattern.clone();
        let method_filter = route.method.filter();
        let handler = move |req: Request| {
            let route = route.clone();
            let pipeline = pipeline.clone();
            async move { dispatch(pipeline, route, req).await }
        };
        router = router.route(&path_pattern, axum::routing::on(method_filter, handler));
    }
    router
}

async fn dispatch(
    pipeline: Arc<Pipeline>,
    route: Arc<RouteDescriptor>,
    req: Request,
) -> Response {
    match run(&pipeline, &route, req).await {
        Ok(response) => response,
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!(
                    method = %route.method,
                    route = %route.path_pattern,
                    error = %err,
                    "request failed"
                );
            } else {
                debug!(
                    method = %route.method,
                    route = %route.path_pattern,
                    error = %err,
                    "request rejected"
                );
            }
            err.into_response_with(pipeline.expose_details)
        }
    }
}

async fn run(
    pipeline: &Pipeline,
    route: &RouteDescriptor,
    req: Request,
) -> Result<Response, HttpError> {
    let (mut parts, body) = req.into_parts();

    // Matched: collect the raw material for binding.
    let path_params = RawPathParams::from_request_parts(&mut parts, &())
        .await
        .map_err(|e| HttpError::internal(format!("path params unavailable: {e}")))?;
    let path_map: HashMap<String, String> = path_params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let query_map: HashMap<String, String> = Query::<HashMap<String, String>>::try_from_uri(
        &parts.uri,
    )
    .map(|Query(map)| map)
    .map_err(|e| HttpError::binding("query", e.to_string()))?;

    let request_info = RequestInfo {
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        headers: parts.headers.clone(),
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0),
    };

    let wants_multipart = route
        .params
        .iter()
        .any(|p| matches!(p.kind, BindingKind::MultipartFile | BindingKind::MultipartField));
    let wants_body = route.params.iter().any(|p| p.kind == BindingKind::Body);

    let (form, body_value) = if wants_multipart {
        let limits = merged_total_limit(&route.params);
        let req = Request::from_parts(parts, body);
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| HttpError::binding("body", e.to_string()))?;
        let form = MultipartForm::collect(multipart, &limits)
            .await
            .map_err(multipart_to_http)?;
        (Some(form), None)
    } else if wants_body {
        let bytes = axum::body::to_bytes(body, pipeline.max_body_bytes)
            .await
            .map_err(|e| HttpError::binding("body", e.to_string()))?;
        let body_value = if bytes.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice::<Value>(&bytes)
                    .map_err(|e| HttpError::binding("body", format!("invalid JSON: {e}")))?,
            )
        };
        (None, body_value)
    } else {
        (None, None)
    };

    // Bound: produce handler arguments in declaration order.
    let mut args = Args::new();
    for param in &route.params {
        bind_param(
            param,
            route,
            &path_map,
            &query_map,
            &request_info,
            body_value.as_ref(),
            form.as_ref(),
            &mut args,
        )?;
    }
    debug!(method = %route.method, route = %route.path_pattern, "request bound");

    // Invoked: resolve the controller through the container and call the
    // handler. Prototype controllers get a fresh instance per request.
    let instance = pipeline.container.lookup(&route.controller).await?;
    let reply = (route.handler)(instance, args).await?;

    // Shaped: encode, validate egress, strip excluded fields.
    shape(pipeline, route, reply)
}

fn shape(
    pipeline: &Pipeline,
    route: &RouteDescriptor,
    reply: Reply,
) -> Result<Response, HttpError> {
    let Reply {
        status,
        headers,
        body,
    } = reply;

    let body_value = match body {
        ReplyBody::Empty => None,
        ReplyBody::Raw(value) => Some(value),
        ReplyBody::Payload(payload) => {
            let mut value = payload
                .encode(&pipeline.codec)
                .map_err(|e| HttpError::internal(format!("response serialization failed: {e}")))?;
            if let Some(egress) = &route.egress {
                egress.check(&value).map_err(|mismatch| {
                    HttpError::EgressValidation {
                        message: format!(
                            "return value does not fit `{}`: {mismatch}",
                            egress.type_name
                        ),
                    }
                })?;
            }
            if !route.egress_exclusions.is_empty() {
                apply_exclusions(&mut value, &route.egress_exclusions);
            }
            Some(value)
        }
    };

    let mut response = match body_value {
        Some(value) => (status, Json(value)).into_response(),
        None => status.into_response(),
    };
    response.headers_mut().extend(headers);
    Ok(response)
}

#[allow(clippy::too_many_arguments)]
fn bind_param(
    param: &ParamBinding,
    route: &RouteDescriptor,
    path_map: &HashMap<String, String>,
    query_map: &HashMap<String, String>,
    request_info: &RequestInfo,
    body_value: Option<&Value>,
    form: Option<&MultipartForm>,
    args: &mut Args,
) -> Result<(), HttpError> {
    match param.kind {
        BindingKind::Path => {
            let raw = path_map
                .get(&param.name)
                .ok_or_else(|| HttpError::binding(&param.name, "missing path segment"))?;
            let value = coerce(param, raw)?;
            args.insert_value(&param.name, value);
        }
        BindingKind::Query => match query_map.get(&param.name) {
            Some(raw) => {
                let value = coerce(param, raw)?;
                args.insert_value(&param.name, value);
            }
            None => apply_absent(param, args)?,
        },
        BindingKind::Body => {
            match body_value {
                Some(value) => {
                    if let Some(ingress) = &route.ingress {
                        ingress.check(value).map_err(|mismatch| {
                            HttpError::IngressValidation {
                                message: format!(
                                    "body does not fit `{}`: {mismatch}",
                                    ingress.type_name
                                ),
                            }
                        })?;
                    }
                    args.insert_body(&param.name, value.clone());
                }
                None if !param.required => {
                    args.insert_body(&param.name, Value::Null);
                }
                None => {
                    return Err(HttpError::binding(&param.name, "missing request body"));
                }
            };
        }
        BindingKind::Request => {
            args.set_request(request_info.clone());
        }
        BindingKind::MultipartFile => {
            let form = form
                .ok_or_else(|| HttpError::binding(&param.name, "expected multipart body"))?;
            let files = form.files.get(&param.name).cloned().unwrap_or_default();
            if files.is_empty() && param.required {
                return Err(multipart_to_http(MultipartError::MissingField(
                    param.name.clone(),
                )));
            }
            if let Some(limits) = &param.limits {
                for file in &files {
                    check_file(&param.name, file.len(), file.content_type.as_deref(), limits)?;
                }
            }
            args.insert_files(&param.name, files);
        }
        BindingKind::MultipartField => {
            let form = form
                .ok_or_else(|| HttpError::binding(&param.name, "expected multipart body"))?;
            match form.text.get(&param.name).and_then(|v| v.first()) {
                Some(raw) => {
                    let value = coerce(param, raw)?;
                    args.insert_value(&param.name, value);
                }
                None => apply_absent(param, args)?,
            }
        }
    }
    Ok(())
}

fn coerce(param: &ParamBinding, raw: &str) -> Result<Value, HttpError> {
    let coerce = param
        .coerce
        .as_ref()
        .ok_or_else(|| HttpError::internal(format!("no coercer for '{}'", param.name)))?;
    coerce(raw).map_err(|message| {
        HttpError::binding(
            &param.name,
            format!("cannot coerce '{raw}' to {}: {message}", param.type_name),
        )
    })
}

fn apply_absent(param: &ParamBinding, args: &mut Args) -> Result<(), HttpError> {
    match (&param.default, param.required) {
        (Some(default), _) => {
            args.insert_value(&param.name, default.clone());
            Ok(())
        }
        (None, false) => {
            args.insert_value(&param.name, Value::Null);
            Ok(())
        }
        (None, true) => Err(HttpError::binding(
            &param.name,
            format!("missing required {} parameter", param.kind.as_str()),
        )),
    }
}

fn check_file(
    name: &str,
    size: usize,
    content_type: Option<&str>,
    limits: &UploadLimits,
) -> Result<(), HttpError> {
    if let Some(limit) = limits.max_file_size {
        if size > limit {
            return Err(multipart_to_http(MultipartError::FileTooLarge {
                field: name.to_string(),
                size,
                limit,
            }));
        }
    }
    if !limits.allowed_types.is_empty() {
        let ct = content_type.unwrap_or_default();
        if !limits.allowed_types.iter().any(|a| a.as_str() == ct) {
            return Err(multipart_to_http(MultipartError::ContentTypeNotAllowed {
                field: name.to_string(),
                content_type: ct.to_string(),
            }));
        }
    }
    Ok(())
}

/// The total-size limit is enforced while draining the stream; per-file
/// limits and content-type checks happen per binding afterwards.
fn merged_total_limit(params: &[ParamBinding]) -> UploadLimits {
    let max_total = params
        .iter()
        .filter_map(|p| p.limits.as_ref())
        .filter_map(|l| l.max_total_size)
        .min();
    UploadLimits {
        max_total_size: max_total,
        ..UploadLimits::default()
    }
}

fn multipart_to_http(err: MultipartError) -> HttpError {
    let parameter = match &err {
        MultipartError::MissingField(f)
        | MultipartError::ParseError { field: f, .. }
        | MultipartError::FileTooLarge { field: f, .. }
        | MultipartError::ContentTypeNotAllowed { field: f, .. } => f.clone(),
        MultipartError::TotalTooLarge { .. } | MultipartError::Malformed(_) => "body".to_string(),
    };
    HttpError::binding(parameter, err.to_string())
}

/// Recursively delete excluded keys from every nested mapping; list items
/// are traversed, scalar values are left alone.
pub(crate) fn apply_exclusions(value: &mut Value, fields: &BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !fields.contains(key));
            for nested in map.values_mut() {
                apply_exclusions(nested, fields);
            }
        }
        Value::Array(items) => {
            for item in items {
                apply_exclusions(item, fields);
            }
        }
        _ => {}
    }
}

/// 404 body for unmatched paths, consistent with the error taxonomy.
pub(crate) async fn fallback_not_found() -> Response {
    let body = serde_json::json!({ "error": "Not Found" });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
