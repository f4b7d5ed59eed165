//! Mitsuki: an opinionated web-application framework.
//!
//! Declarative controllers over a component container with layered
//! configuration, typed request binding, and periodic task scheduling.
//!
//! ```ignore
//! use mitsuki::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     Mitsuki::builder()
//!         .register::<UserRepository>()
//!         .register::<UserService>()
//!         .register_controller::<UserController>()
//!         .with(Tracing)
//!         .with(Health)
//!         .build()
//!         .await?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub use mitsuki_core::*;

#[cfg(feature = "scheduler")]
pub use mitsuki_scheduler as scheduler;

/// One-stop imports for application code.
pub mod prelude {
    pub use mitsuki_core::prelude::*;

    #[cfg(feature = "scheduler")]
    pub use mitsuki_scheduler::{Scheduler, SchedulerHandle};
}
