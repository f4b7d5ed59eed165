//! Component container: descriptor catalogue, dependency-graph resolution,
//! singleton caching, and lifecycle.

mod container;
mod descriptor;
mod registry;
mod resolve;

pub use container::Container;
pub use descriptor::{
    short_type_name, AsyncComponent, BoxError, Component, ComponentContext, ComponentDescriptor,
    ComponentKind, DependencyRequest, DescriptorBuilder, Instance, Scope,
};
pub use registry::ComponentRegistry;

use std::fmt;

use crate::config::ConfigError;

/// Errors raised while resolving or using the component graph.
///
/// Any of these during startup aborts the application with the offending
/// descriptor named; no partial container is ever exposed to user code.
#[derive(Debug)]
pub enum ContainerError {
    /// Two active descriptors share a name under the selected profile.
    DuplicateName { name: String, profile: String },
    /// A declared dependency matches no active descriptor.
    MissingDependency {
        component: String,
        dependency: String,
    },
    /// A by-type dependency matches several active descriptors and carries
    /// no name hint to disambiguate.
    AmbiguousDependency {
        component: String,
        dependency: String,
        candidates: Vec<String>,
    },
    /// The dependency graph restricted to active descriptors has a cycle.
    CircularDependency { cycle: Vec<String> },
    /// A component factory failed.
    Instantiation { component: String, message: String },
    /// A lookup named a component that is not active.
    UnknownComponent(String),
    /// A lookup or context access expected a different concrete type.
    TypeMismatch { name: String, expected: &'static str },
    /// A value-injection dependency failed to resolve through the
    /// configuration store.
    Configuration(ConfigError),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::DuplicateName { name, profile } => {
                let scope = if profile.is_empty() {
                    "the base profile".to_string()
                } else {
                    format!("profile '{profile}'")
                };
                write!(
                    f,
                    "Component '{name}' is registered more than once for {scope}"
                )
            }
            ContainerError::MissingDependency {
                component,
                dependency,
            } => write!(
                f,
                "Missing dependency for component '{component}': '{dependency}' matches no \
                 active descriptor. Register it, or mark the dependency optional."
            ),
            ContainerError::AmbiguousDependency {
                component,
                dependency,
                candidates,
            } => write!(
                f,
                "Ambiguous dependency for component '{component}': '{dependency}' matches \
                 several descriptors ({}). Add a name hint to pick one.",
                candidates.join(", ")
            ),
            ContainerError::CircularDependency { cycle } => {
                write!(f, "Circular dependency detected: {}", cycle.join(" -> "))
            }
            ContainerError::Instantiation { component, message } => {
                write!(f, "Failed to construct component '{component}': {message}")
            }
            ContainerError::UnknownComponent(name) => {
                write!(f, "No active component named '{name}'")
            }
            ContainerError::TypeMismatch { name, expected } => {
                write!(f, "Component '{name}' is not a `{expected}`")
            }
            ContainerError::Configuration(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ContainerError {}

impl From<ConfigError> for ContainerError {
    fn from(err: ConfigError) -> Self {
        ContainerError::Configuration(err)
    }
}
