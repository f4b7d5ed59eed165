//! Core runtime for the Mitsuki web framework: the component container,
//! layered configuration, the declarative routing pipeline, and the
//! application runtime that wires them together.

pub mod builder;
pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod layers;
pub mod lifecycle;
pub mod meta;
pub mod plugin;
pub mod plugins;
pub mod prelude;
pub mod scheduling;
pub mod web;

pub use builder::{App, AppBuilder, Mitsuki};
pub use config::{ConfigError, ConfigLoader, ConfigStore, ConfigValue, FromConfigValue, Source};
pub use container::{
    AsyncComponent, BoxError, Component, ComponentContext, ComponentDescriptor, ComponentKind,
    ComponentRegistry, Container, ContainerError, DependencyRequest, Instance, Scope,
};
pub use error::{HttpError, StartupError};
pub use layers::init_tracing;
pub use meta::{openapi_view, ParamInfo, ParamLocation, RouteInfo};
pub use plugin::Plugin;
pub use scheduling::{IntoTaskResult, Scheduled, ScheduledTaskSpec, TriggerSpec};
pub use web::{
    Args, BindingKind, Controller, EncoderRegistry, FileUpload, HttpMethod, IntoReply, JsonCodec,
    Reply, RequestInfo, RouteSpec, RouteTable, UploadLimits,
};
