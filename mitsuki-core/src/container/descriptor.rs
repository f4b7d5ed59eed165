use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::{ConfigStore, ConfigValue, FromConfigValue};
use crate::container::ContainerError;
use crate::scheduling::ScheduledTaskSpec;
use crate::web::controller::ControllerRouteSet;

/// Boxed error type returned by user factories and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A resolved component instance, shared by the container.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type FactoryFn = Arc<
    dyn Fn(ComponentContext) -> Pin<Box<dyn Future<Output = Result<Instance, BoxError>> + Send>>
        + Send
        + Sync,
>;

pub(crate) type ShutdownFn = Arc<
    dyn Fn(Instance) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> + Send + Sync,
>;

/// The short (unqualified) name of a type, used as the default component name.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = match full.find('<') {
        Some(idx) => &full[..idx],
        None => full,
    };
    base.rsplit("::").next().unwrap_or(base)
}

/// What role a component plays in the application layering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Service,
    Repository,
    Controller,
    Configuration,
    Provider,
    Generic,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentKind::Service => "service",
            ComponentKind::Repository => "repository",
            ComponentKind::Controller => "controller",
            ComponentKind::Configuration => "configuration",
            ComponentKind::Provider => "provider",
            ComponentKind::Generic => "generic",
        };
        f.write_str(s)
    }
}

/// Instance lifecycle: one per container, or one per injection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Singleton,
    Prototype,
}

/// A single declared dependency of a component.
#[derive(Clone)]
pub enum DependencyRequest {
    /// Another managed component, matched by name-or-type (see container
    /// resolution rules).
    Component {
        param: String,
        type_id: TypeId,
        type_name: &'static str,
        name_hint: Option<String>,
        optional: bool,
    },
    /// A configuration value, resolved through the config store at
    /// instantiation time, never through the container.
    Value {
        param: String,
        key: String,
        default: Option<ConfigValue>,
    },
}

impl DependencyRequest {
    pub fn component<T: 'static>(param: &str) -> Self {
        DependencyRequest::Component {
            param: param.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            name_hint: None,
            optional: false,
        }
    }

    pub fn named<T: 'static>(param: &str, name: &str) -> Self {
        DependencyRequest::Component {
            param: param.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            name_hint: Some(name.to_string()),
            optional: false,
        }
    }

    pub fn optional<T: 'static>(param: &str) -> Self {
        DependencyRequest::Component {
            param: param.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            name_hint: None,
            optional: true,
        }
    }

    pub fn value(param: &str, key: &str) -> Self {
        DependencyRequest::Value {
            param: param.to_string(),
            key: key.to_string(),
            default: None,
        }
    }

    pub fn value_or(param: &str, key: &str, default: impl Into<ConfigValue>) -> Self {
        DependencyRequest::Value {
            param: param.to_string(),
            key: key.to_string(),
            default: Some(default.into()),
        }
    }

    /// The parameter name this dependency binds to.
    pub fn param(&self) -> &str {
        match self {
            DependencyRequest::Component { param, .. } => param,
            DependencyRequest::Value { param, .. } => param,
        }
    }
}

impl fmt::Debug for DependencyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyRequest::Component {
                param,
                type_name,
                name_hint,
                optional,
                ..
            } => f
                .debug_struct("Component")
                .field("param", param)
                .field("type", type_name)
                .field("name_hint", name_hint)
                .field("optional", optional)
                .finish(),
            DependencyRequest::Value { param, key, .. } => f
                .debug_struct("Value")
                .field("param", param)
                .field("key", key)
                .finish(),
        }
    }
}

/// Metadata and factory for a single managed component.
///
/// Descriptors are declarative: creating one constructs nothing. The
/// container turns active descriptors into instances during resolution.
#[derive(Clone)]
pub struct ComponentDescriptor {
    pub(crate) name: String,
    pub(crate) kind: ComponentKind,
    pub(crate) scope: Scope,
    pub(crate) profiles: BTreeSet<String>,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) dependencies: Vec<DependencyRequest>,
    pub(crate) factory: FactoryFn,
    pub(crate) shutdown: Option<ShutdownFn>,
    pub(crate) routes: Option<fn() -> ControllerRouteSet>,
    pub(crate) scheduled: Option<fn() -> Vec<ScheduledTaskSpec>>,
}

impl ComponentDescriptor {
    /// Start building a descriptor for a component of type `T`.
    pub fn builder<T: Clone + Send + Sync + 'static>(
        name: impl Into<String>,
    ) -> DescriptorBuilder<T> {
        DescriptorBuilder {
            name: name.into(),
            kind: ComponentKind::Generic,
            scope: Scope::Singleton,
            profiles: BTreeSet::new(),
            dependencies: Vec::new(),
            shutdown: None,
            routes: None,
            scheduled: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Descriptor wrapping a pre-built instance (always singleton).
    pub fn provided<T: Clone + Send + Sync + 'static>(name: impl Into<String>, value: T) -> Self {
        ComponentDescriptor::builder::<T>(name).build_with(move |_| Ok(value.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|s| s.as_str())
    }

    pub fn dependencies(&self) -> &[DependencyRequest] {
        &self.dependencies
    }

    /// Whether this descriptor is active under the given profile.
    ///
    /// An empty profile set means active everywhere.
    pub fn active_for(&self, profile: &str) -> bool {
        self.profiles.is_empty() || self.profiles.contains(profile)
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("profiles", &self.profiles)
            .field("type", &self.type_name)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Fluent builder for a [`ComponentDescriptor`].
pub struct DescriptorBuilder<T> {
    name: String,
    kind: ComponentKind,
    scope: Scope,
    profiles: BTreeSet<String>,
    dependencies: Vec<DependencyRequest>,
    shutdown: Option<ShutdownFn>,
    routes: Option<fn() -> ControllerRouteSet>,
    scheduled: Option<fn() -> Vec<ScheduledTaskSpec>>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Clone + Send + Sync + 'static> DescriptorBuilder<T> {
    pub fn kind(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn prototype(mut self) -> Self {
        self.scope = Scope::Prototype;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Restrict this component to the named profiles.
    pub fn profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiles.extend(profiles.into_iter().map(Into::into));
        self
    }

    pub fn depends_on<D: 'static>(mut self, param: &str) -> Self {
        self.dependencies.push(DependencyRequest::component::<D>(param));
        self
    }

    pub fn depends_on_named<D: 'static>(mut self, param: &str, name: &str) -> Self {
        self.dependencies.push(DependencyRequest::named::<D>(param, name));
        self
    }

    pub fn depends_on_optional<D: 'static>(mut self, param: &str) -> Self {
        self.dependencies.push(DependencyRequest::optional::<D>(param));
        self
    }

    /// Inject a configuration value, resolved when the component is built.
    pub fn value(mut self, param: &str, key: &str) -> Self {
        self.dependencies.push(DependencyRequest::value(param, key));
        self
    }

    pub fn value_or(mut self, param: &str, key: &str, default: impl Into<ConfigValue>) -> Self {
        self.dependencies
            .push(DependencyRequest::value_or(param, key, default));
        self
    }

    pub fn dependency(mut self, request: DependencyRequest) -> Self {
        self.dependencies.push(request);
        self
    }

    /// Hook invoked (in reverse resolution order) during container shutdown.
    pub fn on_shutdown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.shutdown = Some(Arc::new(
            move |instance: Instance| -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> {
                match instance.downcast_ref::<T>().cloned() {
                    Some(component) => Box::pin(hook(component)),
                    None => Box::pin(async move {
                        Err(format!("shutdown hook target is not a `{}`", type_name::<T>()).into())
                    }),
                }
            },
        ));
        self
    }

    pub(crate) fn routes_from(mut self, routes: fn() -> ControllerRouteSet) -> Self {
        self.routes = Some(routes);
        self
    }

    pub(crate) fn scheduled_from(mut self, tasks: fn() -> Vec<ScheduledTaskSpec>) -> Self {
        self.scheduled = Some(tasks);
        self
    }

    /// Finish with a synchronous factory.
    pub fn build_with<F>(self, factory: F) -> ComponentDescriptor
    where
        F: Fn(&ComponentContext) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Arc::new(
            move |ctx: ComponentContext| -> Pin<Box<dyn Future<Output = Result<Instance, BoxError>> + Send>> {
                let result = factory(&ctx);
                Box::pin(async move { result.map(|v| Arc::new(v) as Instance) })
            },
        );
        self.finish(factory)
    }

    /// Finish with an asynchronous factory.
    pub fn build_async<F, Fut>(self, factory: F) -> ComponentDescriptor
    where
        F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let factory: FactoryFn = Arc::new(
            move |ctx: ComponentContext| -> Pin<Box<dyn Future<Output = Result<Instance, BoxError>> + Send>> {
                let fut = factory(ctx);
                Box::pin(async move { fut.await.map(|v| Arc::new(v) as Instance) })
            },
        );
        self.finish(factory)
    }

    fn finish(self, factory: FactoryFn) -> ComponentDescriptor {
        ComponentDescriptor {
            name: self.name,
            kind: self.kind,
            scope: self.scope,
            profiles: self.profiles,
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            dependencies: self.dependencies,
            factory,
            shutdown: self.shutdown,
            routes: self.routes,
            scheduled: self.scheduled,
        }
    }
}

// ── ComponentContext ────────────────────────────────────────────────────────

/// Resolved dependencies handed to a component factory.
///
/// Each declared [`DependencyRequest`] appears under its parameter name:
/// component dependencies as instances, value dependencies as resolved
/// configuration values.
pub struct ComponentContext {
    pub(crate) component_name: String,
    pub(crate) args: HashMap<String, Instance>,
    pub(crate) values: HashMap<String, ConfigValue>,
    pub(crate) config: Arc<ConfigStore>,
}

impl ComponentContext {
    /// Retrieve a component dependency by parameter name, cloning it out.
    pub fn component<T: Clone + 'static>(&self, param: &str) -> Result<T, ContainerError> {
        let instance = self.args.get(param).ok_or_else(|| {
            ContainerError::MissingDependency {
                component: self.component_name.clone(),
                dependency: param.to_string(),
            }
        })?;
        instance
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ContainerError::TypeMismatch {
                name: format!("{}#{param}", self.component_name),
                expected: type_name::<T>(),
            })
    }

    /// Retrieve an optional component dependency, `None` if unmatched.
    pub fn component_opt<T: Clone + 'static>(&self, param: &str) -> Option<T> {
        self.args
            .get(param)
            .and_then(|i| i.downcast_ref::<T>())
            .cloned()
    }

    /// Retrieve a resolved configuration value dependency.
    pub fn value<V: FromConfigValue>(&self, param: &str) -> Result<V, ContainerError> {
        let value = self.values.get(param).ok_or_else(|| {
            ContainerError::MissingDependency {
                component: self.component_name.clone(),
                dependency: param.to_string(),
            }
        })?;
        V::from_config_value(value, param).map_err(ContainerError::Configuration)
    }

    /// Direct access to the frozen configuration store.
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("component", &self.component_name)
            .field("args", &self.args.keys().collect::<Vec<_>>())
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Component traits ────────────────────────────────────────────────────────

/// Trait for types that can be auto-constructed by the container.
///
/// Implementing this trait (and calling `registry.register::<T>()`) is the
/// common registration path; the descriptor builder covers everything else
/// (custom names, profiles, prototype scope, shutdown hooks).
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a registered component type",
    label = "this type is not a component",
    note = "implement the `Component` (or `AsyncComponent`) trait, or register a descriptor built with `ComponentDescriptor::builder`"
)]
pub trait Component: Clone + Send + Sync + 'static {
    /// Unique component name; defaults to the short type name.
    fn component_name() -> &'static str {
        short_type_name::<Self>()
    }

    fn kind() -> ComponentKind {
        ComponentKind::Generic
    }

    fn scope() -> Scope {
        Scope::Singleton
    }

    /// Profiles this component is restricted to; empty = all profiles.
    fn profiles() -> &'static [&'static str] {
        &[]
    }

    fn dependencies() -> Vec<DependencyRequest> {
        Vec::new()
    }

    /// Construct the component from its resolved dependencies.
    fn construct(ctx: &ComponentContext) -> Result<Self, BoxError>;
}

/// Trait for components that require async initialization (DB pools,
/// HTTP clients, ...). The constructor is awaited during resolution.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a registered async component type",
    label = "this type is not an async component",
    note = "implement the `AsyncComponent` trait, or register a descriptor built with `build_async`"
)]
pub trait AsyncComponent: Clone + Send + Sync + 'static {
    fn component_name() -> &'static str {
        short_type_name::<Self>()
    }

    fn kind() -> ComponentKind {
        ComponentKind::Generic
    }

    fn scope() -> Scope {
        Scope::Singleton
    }

    fn profiles() -> &'static [&'static str] {
        &[]
    }

    fn dependencies() -> Vec<DependencyRequest> {
        Vec::new()
    }

    fn construct(ctx: ComponentContext) -> impl Future<Output = Result<Self, BoxError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod nested {
        #[derive(Clone)]
        pub struct Widget;
        #[derive(Clone)]
        pub struct Holder<T>(pub T);
    }

    #[test]
    fn short_name_strips_path() {
        assert_eq!(short_type_name::<nested::Widget>(), "Widget");
    }

    #[test]
    fn short_name_strips_generics() {
        assert_eq!(short_type_name::<nested::Holder<nested::Widget>>(), "Holder");
    }

    #[test]
    fn profile_predicate() {
        let d = ComponentDescriptor::builder::<nested::Widget>("Widget")
            .profiles(["prod"])
            .build_with(|_| Ok(nested::Widget));
        assert!(d.active_for("prod"));
        assert!(!d.active_for("dev"));
        assert!(!d.active_for(""));

        let open = ComponentDescriptor::builder::<nested::Widget>("Widget")
            .build_with(|_| Ok(nested::Widget));
        assert!(open.active_for(""));
        assert!(open.active_for("anything"));
    }
}
