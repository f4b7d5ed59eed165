use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::{ConfigError, ConfigStore};
use crate::container::descriptor::{ComponentDescriptor, ComponentKind, Instance, Scope};
use crate::container::resolve::{resolve_graph, ActiveComponent, Edge};
use crate::container::{ComponentContext, ComponentRegistry, ContainerError};
use crate::scheduling::ScheduledTaskSpec;
use crate::web::route::RouteSpec;

struct Inner {
    components: HashMap<String, ActiveComponent>,
    singletons: HashMap<String, Instance>,
    /// Topological instantiation order, reversed for shutdown.
    order: Vec<String>,
    config: Arc<ConfigStore>,
    profile: String,
}

/// The resolved, frozen component container.
///
/// Produced once at startup by [`Container::resolve`]. Singletons live in a
/// write-once instance map; lookups are read-only and safe for concurrent
/// readers without locking. Prototype-scoped components re-invoke their
/// factory per lookup.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    /// Resolve the dependency graph and instantiate all singletons in
    /// topological order. Consumes the registry; any graph fault or factory
    /// error aborts with a structured [`ContainerError`].
    pub async fn resolve(
        registry: ComponentRegistry,
        config: Arc<ConfigStore>,
    ) -> Result<Self, ContainerError> {
        let profile = config.profile().to_string();
        let resolution = resolve_graph(registry.into_descriptors(), &profile)?;

        let mut singletons: HashMap<String, Instance> = HashMap::new();
        for name in &resolution.order {
            let component = &resolution.components[name];
            if component.descriptor.scope == Scope::Singleton {
                debug!(component = %name, kind = %component.descriptor.kind(), "constructing");
                let instance =
                    instantiate(name, &resolution.components, &singletons, &config).await?;
                singletons.insert(name.clone(), instance);
            }
        }

        info!(
            components = resolution.order.len(),
            singletons = singletons.len(),
            profile = %profile,
            "component container resolved"
        );

        Ok(Container {
            inner: Arc::new(Inner {
                components: resolution.components,
                singletons,
                order: resolution.order,
                config,
                profile,
            }),
        })
    }

    /// Look up a component by name. Singletons return the cached instance;
    /// prototypes re-invoke their factory.
    pub async fn lookup(&self, name: &str) -> Result<Instance, ContainerError> {
        let component = self
            .inner
            .components
            .get(name)
            .ok_or_else(|| ContainerError::UnknownComponent(name.to_string()))?;
        match component.descriptor.scope {
            Scope::Singleton => Ok(self.inner.singletons[name].clone()),
            Scope::Prototype => {
                instantiate(
                    name,
                    &self.inner.components,
                    &self.inner.singletons,
                    &self.inner.config,
                )
                .await
            }
        }
    }

    /// Look up a component by name and downcast it to `T`.
    pub async fn lookup_as<T: Clone + 'static>(&self, name: &str) -> Result<T, ContainerError> {
        let instance = self.lookup(name).await?;
        instance
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Look up the unique active component producing type `T`.
    pub async fn lookup_by_type<T: Clone + 'static>(&self) -> Result<T, ContainerError> {
        let name = self.unique_name_for(TypeId::of::<T>(), std::any::type_name::<T>())?;
        self.lookup_as::<T>(&name).await
    }

    /// Synchronous access to a resolved singleton by type. Returns `None`
    /// for unknown, prototype-scoped, or ambiguous types.
    pub fn singleton<T: Clone + 'static>(&self) -> Option<T> {
        let name = self
            .unique_name_for(TypeId::of::<T>(), std::any::type_name::<T>())
            .ok()?;
        self.inner
            .singletons
            .get(&name)
            .and_then(|i| i.downcast_ref::<T>())
            .cloned()
    }

    fn unique_name_for(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<String, ContainerError> {
        let mut matches = self
            .inner
            .components
            .values()
            .filter(|c| c.descriptor.type_id == type_id);
        match (matches.next(), matches.next()) {
            (Some(only), None) => Ok(only.descriptor.name.clone()),
            (Some(a), Some(b)) => Err(ContainerError::AmbiguousDependency {
                component: "<lookup>".to_string(),
                dependency: type_name.to_string(),
                candidates: vec![a.descriptor.name.clone(), b.descriptor.name.clone()],
            }),
            (None, _) => Err(ContainerError::UnknownComponent(type_name.to_string())),
        }
    }

    /// The active profile this container was resolved for.
    pub fn profile(&self) -> &str {
        &self.inner.profile
    }

    /// The frozen configuration store.
    pub fn config(&self) -> &ConfigStore {
        &self.inner.config
    }

    /// All active descriptors, in instantiation order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.inner
            .order
            .iter()
            .map(|name| &self.inner.components[name].descriptor)
    }

    /// Route specs declared by active controller components: descriptor
    /// name, base path, and the controller's route specs.
    pub(crate) fn controller_routes(&self) -> Vec<(String, &'static str, Vec<RouteSpec>)> {
        self.descriptors()
            .filter(|d| d.kind() == ComponentKind::Controller)
            .filter_map(|d| {
                d.routes.map(|routes| {
                    let set = routes();
                    (d.name.clone(), set.base_path, set.routes)
                })
            })
            .collect()
    }

    /// Scheduled task specs declared by active components, paired with the
    /// owning component's descriptor name.
    pub fn scheduled_tasks(&self) -> Vec<(String, Vec<ScheduledTaskSpec>)> {
        self.descriptors()
            .filter_map(|d| d.scheduled.map(|tasks| (d.name.clone(), tasks())))
            .collect()
    }

    /// Run shutdown hooks in reverse topological order.
    ///
    /// Hook errors are logged and never propagated; shutdown always visits
    /// every hook.
    pub async fn shutdown(&self) {
        for name in self.inner.order.iter().rev() {
            let component = &self.inner.components[name];
            let Some(hook) = component.descriptor.shutdown.clone() else {
                continue;
            };
            let Some(instance) = self.inner.singletons.get(name).cloned() else {
                continue;
            };
            debug!(component = %name, "running shutdown hook");
            if let Err(e) = hook(instance).await {
                error!(component = %name, error = %e, "shutdown hook failed");
            }
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("components", &self.inner.order)
            .field("profile", &self.inner.profile)
            .finish()
    }
}

/// Construct one component from its matched edges.
///
/// Singleton dependencies come from the already-built instance map
/// (guaranteed present by topological order); prototype dependencies are
/// instantiated fresh per injection point.
fn instantiate<'a>(
    name: &'a str,
    components: &'a HashMap<String, ActiveComponent>,
    singletons: &'a HashMap<String, Instance>,
    config: &'a Arc<ConfigStore>,
) -> Pin<Box<dyn Future<Output = Result<Instance, ContainerError>> + Send + 'a>> {
    Box::pin(async move {
        let component = &components[name];
        let mut args: HashMap<String, Instance> = HashMap::new();
        let mut values = HashMap::new();

        for edge in &component.edges {
            match edge {
                Edge::Component { param, target } => {
                    let Some(target) = target else { continue };
                    let dep = &components[target];
                    let instance = match dep.descriptor.scope {
                        Scope::Singleton => singletons[target].clone(),
                        Scope::Prototype => {
                            instantiate(target, components, singletons, config).await?
                        }
                    };
                    args.insert(param.clone(), instance);
                }
                Edge::Value {
                    param,
                    key,
                    default,
                } => {
                    let value = match (config.raw(key), default) {
                        (Some(v), _) => v.clone(),
                        (None, Some(d)) => d.clone(),
                        (None, None) => {
                            return Err(ContainerError::Configuration(ConfigError::NotFound(
                                key.clone(),
                            )));
                        }
                    };
                    values.insert(param.clone(), value);
                }
            }
        }

        let ctx = ComponentContext {
            component_name: name.to_string(),
            args,
            values,
            config: config.clone(),
        };

        (component.descriptor.factory)(ctx)
            .await
            .map_err(|e| ContainerError::Instantiation {
                component: name.to_string(),
                message: e.to_string(),
            })
    })
}
