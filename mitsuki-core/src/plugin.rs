use crate::builder::AppBuilder;

/// A composable unit of functionality installed into the [`AppBuilder`].
///
/// Plugins contribute layers, routes, components, and lifecycle hooks
/// through the builder's public surface; they run before `build()`, so
/// everything they register participates in normal startup.
///
/// ```ignore
/// Mitsuki::builder()
///     .with(Tracing)
///     .with(Health)
///     .with(Cors::permissive())
/// ```
pub trait Plugin {
    /// Name used in startup logs.
    fn name() -> &'static str
    where
        Self: Sized;

    fn install(self, app: AppBuilder) -> AppBuilder;
}
