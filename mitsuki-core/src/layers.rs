//! Tower layers and tracing bootstrap shared by the built-in plugins.

use std::sync::Once;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

static INIT: Once = Once::new();

/// Install the global tracing subscriber (fmt output, `RUST_LOG` filter,
/// `info` default). Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).try_init();
    });
}

/// Permissive CORS for development: any origin, method, and header.
pub fn default_cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Request/response logging at the default tower-http levels.
pub fn default_trace(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}
