pub mod controllers;
pub mod models;
pub mod services;

use mitsuki::prelude::*;

use controllers::{InfoController, UserController};
use services::{CleanupJob, UserRepository, UserService};

/// Assemble the demo application against the given configuration.
pub async fn build_app(config: ConfigStore) -> Result<App, mitsuki::StartupError> {
    Mitsuki::builder()
        .with_config(config)
        .register::<UserRepository>()
        .register::<UserService>()
        .register_scheduled::<CleanupJob>()
        .register_controller::<UserController>()
        .register_controller::<InfoController>()
        .with(Health)
        .with(Cors::permissive())
        .with(Scheduler::new().with_endpoint())
        .build()
        .await
}
