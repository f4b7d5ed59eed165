use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::config::ConfigStore;
use crate::container::{
    AsyncComponent, BoxError, Component, ComponentDescriptor, ComponentRegistry, Container, Scope,
};
use crate::error::StartupError;
use crate::http::Router;
use crate::lifecycle::{ShutdownHook, StartupHook};
use crate::meta::RouteInfo;
use crate::plugin::Plugin;
use crate::scheduling::{Scheduled, ScheduledTaskSpec};
use crate::web::codec::{EncoderRegistry, JsonCodec};
use crate::web::controller::Controller;
use crate::web::pipeline::{self, Pipeline};
use crate::web::route::RouteTable;

type LayerFn = Box<dyn FnOnce(Router) -> Router + Send>;

/// Entry point: `Mitsuki::builder()`.
pub struct Mitsuki;

impl Mitsuki {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }
}

/// Builder for assembling a Mitsuki application.
///
/// Collects configuration, component registrations, plugins, raw router
/// fragments, and lifecycle hooks, then [`build()`](Self::build) performs
/// the one-shot startup sequence: configuration finalize → container
/// resolution → route table → pipeline assembly.
pub struct AppBuilder {
    config: Option<ConfigStore>,
    registry: ComponentRegistry,
    layers: Vec<LayerFn>,
    extra_routers: Vec<Router>,
    startup_hooks: Vec<StartupHook>,
    shutdown_hooks: Vec<ShutdownHook>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            registry: ComponentRegistry::new(),
            layers: Vec::new(),
            extra_routers: Vec::new(),
            startup_hooks: Vec::new(),
            shutdown_hooks: Vec::new(),
        }
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Use a pre-loaded configuration store instead of loading
    /// `application.yaml` from the working directory.
    pub fn with_config(mut self, config: ConfigStore) -> Self {
        self.config = Some(config);
        self
    }

    // ── Component registration (delegates to the registry) ──────────────

    pub fn register<T: Component>(mut self) -> Self {
        self.registry.register::<T>();
        self
    }

    pub fn register_async<T: AsyncComponent>(mut self) -> Self {
        self.registry.register_async::<T>();
        self
    }

    pub fn register_controller<C: Component + Controller>(mut self) -> Self {
        self.registry.register_controller::<C>();
        self
    }

    pub fn register_scheduled<T: Component + Scheduled>(mut self) -> Self {
        self.registry.register_scheduled::<T>();
        self
    }

    pub fn register_descriptor(mut self, descriptor: ComponentDescriptor) -> Self {
        self.registry.register_descriptor(descriptor);
        self
    }

    pub fn provide<T: Clone + Send + Sync + 'static>(
        mut self,
        name: impl Into<String>,
        value: T,
    ) -> Self {
        self.registry.provide(name, value);
        self
    }

    pub fn register_provider<Cfg, T, F, Fut>(mut self, name: &str, method: F) -> Self
    where
        Cfg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(Cfg) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.registry.register_provider::<Cfg, T, F, Fut>(name, method);
        self
    }

    pub fn register_provider_scoped<Cfg, T, F, Fut>(
        mut self,
        name: &str,
        scope: Scope,
        method: F,
    ) -> Self
    where
        Cfg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(Cfg) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.registry
            .register_provider_scoped::<Cfg, T, F, Fut>(name, scope, method);
        self
    }

    // ── Plugins, layers, raw routes ─────────────────────────────────────

    /// Install a [`Plugin`].
    pub fn with<P: Plugin>(self, plugin: P) -> Self {
        tracing::debug!(plugin = P::name(), "installing plugin");
        plugin.install(self)
    }

    /// Apply a transformation to the assembled router (escape hatch for
    /// arbitrary Tower layers).
    pub fn with_layer_fn<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.layers.push(Box::new(f));
        self
    }

    /// Merge a raw axum router alongside the routed controllers. Raw routes
    /// share the global layers but get no binding pipeline.
    pub fn merge_router(mut self, router: Router) -> Self {
        self.extra_routers.push(router);
        self
    }

    // ── Lifecycle hooks ─────────────────────────────────────────────────

    /// Run before the transport starts listening. An `Err` aborts startup.
    pub fn on_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Container) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.startup_hooks
            .push(Box::new(move |container| Box::pin(hook(container))));
        self
    }

    /// Run after the transport stops, before container shutdown.
    pub fn on_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.shutdown_hooks
            .push(Box::new(move || Box::pin(hook())));
        self
    }

    // ── Assembly ────────────────────────────────────────────────────────

    /// Execute the startup sequence and produce a runnable [`App`].
    pub async fn build(self) -> Result<App, StartupError> {
        let config = Arc::new(match self.config {
            Some(config) => config,
            None => ConfigStore::load()?,
        });

        let container = Container::resolve(self.registry, config.clone()).await?;

        let table = Arc::new(RouteTable::build(container.controller_routes())?);
        info!(routes = table.len(), "route table materialized");

        let mut codec = JsonCodec::with_builtins();
        if let Some(extra) = container.singleton::<EncoderRegistry>() {
            codec.extend(&extra);
        }

        let expose_details = config.get_or(
            "mitsuki.errors.include-details",
            config.profile() == "dev",
        )?;
        let max_body_bytes =
            config.get_or::<usize>("mitsuki.server.max-body-bytes", 2 * 1024 * 1024)?;

        let core = Arc::new(Pipeline {
            container: container.clone(),
            codec,
            expose_details,
            max_body_bytes,
        });

        let mut router =
            pipeline::build_router(&table, core).fallback(pipeline::fallback_not_found);
        for extra in self.extra_routers {
            router = router.merge(extra);
        }

        // Ambient layers: panics become 500s; a configured request timeout
        // is enforced at the transport boundary.
        router = router.layer(CatchPanicLayer::new());
        if let Some(timeout_ms) =
            config.get_or::<Option<u64>>("mitsuki.server.request-timeout-ms", None)?
        {
            router = router.layer(TimeoutLayer::new(Duration::from_millis(timeout_ms)));
        }

        for layer_fn in self.layers {
            router = layer_fn(router);
        }

        Ok(App {
            router,
            container,
            routes: table,
            config,
            startup_hooks: self.startup_hooks,
            shutdown_hooks: self.shutdown_hooks,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully assembled application: frozen container, route table, and the
/// router ready to serve.
pub struct App {
    router: Router,
    container: Container,
    routes: Arc<RouteTable>,
    config: Arc<ConfigStore>,
    startup_hooks: Vec<StartupHook>,
    shutdown_hooks: Vec<ShutdownHook>,
}

impl App {
    /// The assembled router, for in-process testing without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The read-only route metadata view (OpenAPI boundary).
    pub fn openapi_view(&self) -> Vec<RouteInfo> {
        crate::meta::openapi_view(&self.routes)
    }

    /// Scheduled task declarations of active components, for the scheduler.
    pub fn scheduled_task_specs(&self) -> Vec<(String, Vec<ScheduledTaskSpec>)> {
        self.container.scheduled_tasks()
    }

    /// Serve on the configured `mitsuki.server.host`/`port`.
    pub async fn run(self) -> Result<(), BoxError> {
        let host: String = self.config.get("mitsuki.server.host")?;
        let port: u16 = self.config.get("mitsuki.server.port")?;
        let addr = format!("{host}:{port}");
        self.serve(&addr).await
    }

    /// Serve on the given address with graceful shutdown; tears down in
    /// reverse startup order afterwards.
    pub async fn serve(self, addr: &str) -> Result<(), BoxError> {
        let App {
            router,
            container,
            routes: _,
            config: _,
            startup_hooks,
            shutdown_hooks,
        } = self;

        for hook in startup_hooks {
            hook(container.clone()).await?;
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "mitsuki server listening");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        // Reverse startup order: hooks (latest first), then the container.
        for hook in shutdown_hooks.into_iter().rev() {
            hook().await;
        }
        container.shutdown().await;

        info!("mitsuki server stopped");
        Ok(())
    }

    /// Run the startup hooks without serving (test support).
    pub async fn start_hooks(&mut self) -> Result<(), BoxError> {
        for hook in std::mem::take(&mut self.startup_hooks) {
            hook(self.container.clone()).await?;
        }
        Ok(())
    }

    /// Run the shutdown hooks and the container shutdown pass without a
    /// transport (test support).
    pub async fn stop_hooks(&mut self) {
        for hook in std::mem::take(&mut self.shutdown_hooks).into_iter().rev() {
            hook().await;
        }
        self.container.shutdown().await;
    }
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl-C");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}
