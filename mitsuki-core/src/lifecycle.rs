use std::future::Future;
use std::pin::Pin;

use crate::container::{BoxError, Container};

/// A startup hook: runs after the container freezes, before the transport
/// listens. Receives the resolved container. An `Err` aborts startup.
pub type StartupHook = Box<
    dyn FnOnce(Container) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> + Send,
>;

/// A shutdown hook: runs after the transport stops, before the container's
/// own shutdown pass.
pub type ShutdownHook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;
