//! Built-in plugins for common cross-cutting concerns.
//!
//! Each plugin implements [`Plugin`](crate::plugin::Plugin) and is
//! installed via [`AppBuilder::with()`](crate::builder::AppBuilder::with).

use crate::builder::AppBuilder;
use crate::http::Router;
use crate::plugin::Plugin;
use tower_http::cors::CorsLayer;

/// CORS plugin.
///
/// Use [`Cors::permissive()`] for a development-friendly configuration that
/// allows any origin, method, and header; use [`Cors::custom()`] with a
/// configured `CorsLayer` for production.
pub struct Cors {
    layer: CorsLayer,
}

impl Cors {
    pub fn permissive() -> Self {
        Self {
            layer: crate::layers::default_cors(),
        }
    }

    pub fn custom(layer: CorsLayer) -> Self {
        Self { layer }
    }
}

impl Plugin for Cors {
    fn name() -> &'static str {
        "Cors"
    }

    fn install(self, app: AppBuilder) -> AppBuilder {
        let layer = self.layer;
        app.with_layer_fn(move |router| router.layer(layer))
    }
}

/// HTTP request/response tracing plugin.
///
/// Initialises the global `tracing` subscriber and adds a tower-http
/// `TraceLayer` that logs requests and responses.
pub struct Tracing;

impl Plugin for Tracing {
    fn name() -> &'static str {
        "Tracing"
    }

    fn install(self, app: AppBuilder) -> AppBuilder {
        crate::layers::init_tracing();
        app.with_layer_fn(|router| router.layer(crate::layers::default_trace()))
    }
}

/// Health-check endpoint plugin: `GET /health` → `OK`.
pub struct Health;

impl Plugin for Health {
    fn name() -> &'static str {
        "Health"
    }

    fn install(self, app: AppBuilder) -> AppBuilder {
        app.merge_router(
            Router::new().route("/health", axum::routing::get(|| async { "OK" })),
        )
    }
}
