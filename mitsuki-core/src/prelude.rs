//! One-stop imports for application code.
//!
//! ```ignore
//! use mitsuki_core::prelude::*;
//! ```

pub use crate::builder::{App, AppBuilder, Mitsuki};
pub use crate::config::{ConfigStore, ConfigValue};
pub use crate::container::{
    BoxError, Component, ComponentContext, ComponentDescriptor, ComponentKind, DependencyRequest,
    Scope,
};
pub use crate::error::HttpError;
pub use crate::http::{Json, StatusCode};
pub use crate::plugins::{Cors, Health, Tracing};
pub use crate::scheduling::{Scheduled, ScheduledTaskSpec, TriggerSpec};
pub use crate::web::{Args, Controller, Reply, RouteSpec, UploadLimits};
