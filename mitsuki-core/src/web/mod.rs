//! Route registry and request pipeline: declarative routes, argument
//! binding, handler invocation, egress validation, and response shaping.

pub mod binding;
pub mod codec;
pub mod controller;
pub mod multipart;
pub(crate) mod pipeline;
pub mod reply;
pub mod route;

pub use binding::{Args, BindingKind, ParamBinding, RequestInfo};
pub use codec::{EncoderRegistry, JsonCodec};
pub use controller::{Controller, ControllerRouteSet};
pub use multipart::{FileUpload, MultipartError, MultipartForm, UploadLimits};
pub use reply::{IntoReply, Reply, ReplyBuilder};
pub use route::{
    HandlerFn, HttpMethod, RouteDescriptor, RouteError, RouteSpec, RouteTable, ShapeCheck,
};
