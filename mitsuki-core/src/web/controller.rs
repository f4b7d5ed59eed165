use crate::web::route::RouteSpec;

/// Route declarations of one controller: base path plus method routes.
pub struct ControllerRouteSet {
    pub base_path: &'static str,
    pub routes: Vec<RouteSpec>,
}

/// Trait for components of kind `controller`.
///
/// A controller is an ordinary container component whose declared routes
/// are collected into the routing table after the container freezes.
/// Handlers run against the instance the container resolves for the
/// controller's descriptor (a fresh one per request for prototype scope).
pub trait Controller: Clone + Send + Sync + 'static {
    /// Path prefix applied to every route of this controller.
    fn base_path() -> &'static str {
        ""
    }

    /// The controller's routed methods.
    fn routes() -> Vec<RouteSpec>;

    #[doc(hidden)]
    fn route_set() -> ControllerRouteSet {
        ControllerRouteSet {
            base_path: Self::base_path(),
            routes: Self::routes(),
        }
    }
}
