use std::net::SocketAddr;

use mitsuki_core::http::{ConnectInfo, IntoResponse, Json, Request, Response, Router, StatusCode};

use crate::SchedulerHandle;

/// `GET /mitsuki/scheduler`: the read-only statistics snapshot.
///
/// When `mitsuki.scheduler.endpoint.allow` is set, only clients whose IP
/// appears in the list get through; requests with no connect info (or any
/// other address) are refused.
pub(crate) fn routes(handle: SchedulerHandle) -> Router {
    Router::new().route(
        "/mitsuki/scheduler",
        axum::routing::get(move |req: Request| {
            let handle = handle.clone();
            async move { serve_snapshot(handle, req) }
        }),
    )
}

fn serve_snapshot(handle: SchedulerHandle, req: Request) -> Response {
    let allowlist = handle.allowlist();
    if !allowlist.is_empty() {
        let permitted = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| {
                let ip = ci.0.ip().to_string();
                allowlist.iter().any(|allowed| *allowed == ip)
            })
            .unwrap_or(false);
        if !permitted {
            let body = serde_json::json!({ "error": "Forbidden" });
            return (StatusCode::FORBIDDEN, Json(body)).into_response();
        }
    }
    Json(handle.snapshot()).into_response()
}
