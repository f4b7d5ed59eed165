use std::future::Future;

use crate::container::descriptor::{
    AsyncComponent, BoxError, Component, ComponentDescriptor, ComponentKind, DependencyRequest,
    DescriptorBuilder, Scope,
};
use crate::scheduling::Scheduled;
use crate::web::controller::Controller;

/// Passive catalogue of component descriptors (populated by declarative
/// registration, consumed once by container resolution).
///
/// Registration is pure: no instance is constructed here, and registrations
/// may arrive in any order. Duplicate-name detection happens at resolution
/// time, because two same-named descriptors are legal as long as their
/// profile predicates never both match.
pub struct ComponentRegistry {
    descriptors: Vec<ComponentDescriptor>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// Append a fully built descriptor.
    pub fn register_descriptor(&mut self, descriptor: ComponentDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Register a [`Component`] type using its trait-declared metadata.
    pub fn register<T: Component>(&mut self) -> &mut Self {
        let descriptor = Self::trait_builder::<T>(
            T::component_name(),
            T::kind(),
            T::scope(),
            T::profiles(),
            T::dependencies(),
        )
        .build_with(|ctx| T::construct(ctx));
        self.register_descriptor(descriptor)
    }

    /// Register an [`AsyncComponent`] type; its constructor is awaited
    /// during resolution.
    pub fn register_async<T: AsyncComponent>(&mut self) -> &mut Self {
        let descriptor = Self::trait_builder::<T>(
            T::component_name(),
            T::kind(),
            T::scope(),
            T::profiles(),
            T::dependencies(),
        )
        .build_async(|ctx| async move { T::construct(ctx).await });
        self.register_descriptor(descriptor)
    }

    /// Register a controller: a [`Component`] whose routes are collected
    /// into the route table after the container freezes.
    pub fn register_controller<C: Component + Controller>(&mut self) -> &mut Self {
        let descriptor = Self::trait_builder::<C>(
            C::component_name(),
            ComponentKind::Controller,
            C::scope(),
            C::profiles(),
            C::dependencies(),
        )
        .routes_from(C::route_set)
        .build_with(|ctx| C::construct(ctx));
        self.register_descriptor(descriptor)
    }

    /// Register a component that also declares scheduled tasks.
    pub fn register_scheduled<T: Component + Scheduled>(&mut self) -> &mut Self {
        let descriptor = Self::trait_builder::<T>(
            T::component_name(),
            T::kind(),
            T::scope(),
            T::profiles(),
            T::dependencies(),
        )
        .scheduled_from(T::scheduled_tasks)
        .build_with(|ctx| T::construct(ctx));
        self.register_descriptor(descriptor)
    }

    /// Provide a pre-built instance under the given name.
    pub fn provide<T: Clone + Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> &mut Self {
        self.register_descriptor(ComponentDescriptor::provided(name, value))
    }

    /// Register a provider method on a configuration component.
    ///
    /// The provider's descriptor depends on the owning configuration
    /// component (by type); its factory resolves that component first and
    /// then invokes `method` on it. Providers participate in the same
    /// topological resolution as every other component.
    pub fn register_provider<Cfg, T, F, Fut>(&mut self, name: &str, method: F) -> &mut Self
    where
        Cfg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(Cfg) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        self.register_provider_scoped::<Cfg, T, F, Fut>(name, Scope::Singleton, method)
    }

    /// [`register_provider`](Self::register_provider) with an explicit
    /// scope. Prototype providers re-invoke the method per injection point.
    pub fn register_provider_scoped<Cfg, T, F, Fut>(
        &mut self,
        name: &str,
        scope: Scope,
        method: F,
    ) -> &mut Self
    where
        Cfg: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(Cfg) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let descriptor = ComponentDescriptor::builder::<T>(name)
            .kind(ComponentKind::Provider)
            .scope(scope)
            .dependency(DependencyRequest::component::<Cfg>("__owner"))
            .build_async(move |ctx| {
                let owner = ctx.component::<Cfg>("__owner");
                let fut = owner.map(|o| method(o));
                async move {
                    match fut {
                        Ok(f) => f.await,
                        Err(e) => Err(Box::new(e) as BoxError),
                    }
                }
            });
        self.register_descriptor(descriptor)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[ComponentDescriptor] {
        &self.descriptors
    }

    pub(crate) fn into_descriptors(self) -> Vec<ComponentDescriptor> {
        self.descriptors
    }

    fn trait_builder<T: Clone + Send + Sync + 'static>(
        name: &'static str,
        kind: ComponentKind,
        scope: Scope,
        profiles: &'static [&'static str],
        dependencies: Vec<DependencyRequest>,
    ) -> DescriptorBuilder<T> {
        let mut builder = ComponentDescriptor::builder::<T>(name)
            .kind(kind)
            .scope(scope)
            .profiles(profiles.iter().copied());
        for dep in dependencies {
            builder = builder.dependency(dep);
        }
        builder
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
