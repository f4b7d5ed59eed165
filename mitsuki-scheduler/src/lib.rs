//! Periodic task scheduler for Mitsuki.
//!
//! Tasks are declared on components through
//! [`Scheduled`](mitsuki_core::scheduling::Scheduled) and discovered from
//! the container after it freezes. Install with `.with(Scheduler::new())`;
//! execution is gated by `mitsuki.scheduler.enabled` (default `false`).
//! A disabled scheduler still discovers its tasks, it just never starts
//! them.
//!
//! The scheduler is process-local: when several worker processes host the
//! same application, each runs its own copy of every task. Nothing here
//! coordinates between instances.

mod endpoint;
mod runtime;
mod stats;
mod trigger;

pub use stats::{SchedulerSnapshot, TaskSnapshot, TaskStatus};
pub use trigger::{Trigger, TriggerError};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mitsuki_core::builder::AppBuilder;
use mitsuki_core::container::{BoxError, Container};
use mitsuki_core::plugin::Plugin;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::runtime::Task;
use crate::stats::TaskStats;

/// Scheduler plugin.
///
/// Provides a [`SchedulerHandle`] component (name `"schedulerHandle"`) for
/// injection, starts discovered tasks when the application starts, and
/// stops them with a bounded grace period on shutdown.
///
/// ```ignore
/// Mitsuki::builder()
///     .register_scheduled::<CleanupJobs>()
///     .with(Scheduler::new().with_endpoint())
/// ```
pub struct Scheduler {
    endpoint: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { endpoint: false }
    }

    /// Also expose `GET /mitsuki/scheduler`: a read-only statistics
    /// snapshot, guarded by the optional
    /// `mitsuki.scheduler.endpoint.allow` IP allowlist.
    pub fn with_endpoint(mut self) -> Self {
        self.endpoint = true;
        self
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Scheduler {
    fn name() -> &'static str {
        "Scheduler"
    }

    fn install(self, app: AppBuilder) -> AppBuilder {
        let handle = SchedulerHandle::new();
        let start_handle = handle.clone();
        let stop_handle = handle.clone();

        let mut app = app
            .provide("schedulerHandle", handle.clone())
            .on_start(move |container| async move { start_handle.start(&container).await })
            .on_stop(move || async move { stop_handle.stop().await });

        if self.endpoint {
            app = app.merge_router(endpoint::routes(handle));
        }
        app
    }
}

struct SchedulerState {
    enabled: bool,
    grace: Duration,
    allowlist: Vec<String>,
    tasks: Vec<Arc<Task>>,
    handles: Vec<JoinHandle<()>>,
}

/// Handle to the scheduler runtime: start/stop, cancellation, and the
/// observability snapshot. Cloneable; registered as a container component
/// so controllers can inject it.
#[derive(Clone)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    state: Arc<Mutex<SchedulerState>>,
}

impl SchedulerHandle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            state: Arc::new(Mutex::new(SchedulerState {
                enabled: false,
                grace: Duration::from_millis(5000),
                allowlist: Vec::new(),
                tasks: Vec::new(),
                handles: Vec::new(),
            })),
        }
    }

    /// Discover and validate tasks from the container, then begin the time
    /// loops when the scheduler is enabled. Invalid triggers abort startup.
    pub async fn start(&self, container: &Container) -> Result<(), BoxError> {
        let config = container.config();
        let enabled = config.get_or("mitsuki.scheduler.enabled", false)?;
        let grace_ms = config.get_or::<u64>("mitsuki.scheduler.grace-period-ms", 5000)?;
        let allowlist =
            config.get_or::<Vec<String>>("mitsuki.scheduler.endpoint.allow", Vec::new())?;

        let mut tasks = Vec::new();
        for (component, specs) in container.scheduled_tasks() {
            for spec in specs {
                let id = format!("{component}.{}", spec.method);
                let trigger = trigger::Trigger::from_spec(&id, &spec.trigger)?;
                let instance = container.lookup(&component).await?;
                let schedule = trigger.describe();
                tasks.push(Arc::new(Task {
                    id,
                    trigger,
                    schedule,
                    run: spec.run.clone(),
                    instance,
                    stats: TaskStats::new(),
                }));
            }
        }

        let mut state = self.state.lock().unwrap();
        state.enabled = enabled;
        state.grace = Duration::from_millis(grace_ms);
        state.allowlist = allowlist;

        if enabled {
            info!(tasks = tasks.len(), "starting scheduler");
            for task in &tasks {
                info!(task = %task.id, schedule = %task.schedule, "scheduling task");
                state
                    .handles
                    .push(runtime::spawn(task.clone(), self.cancel.clone()));
            }
        } else if !tasks.is_empty() {
            info!(
                tasks = tasks.len(),
                "scheduler disabled; discovered tasks stay inactive"
            );
        }
        state.tasks = tasks;
        Ok(())
    }

    /// Stop accepting new starts, give in-flight executions the configured
    /// grace period, then mark whatever is still running as stopped.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let (handles, grace, tasks) = {
            let mut state = self.state.lock().unwrap();
            (
                std::mem::take(&mut state.handles),
                state.grace,
                state.tasks.clone(),
            )
        };
        if handles.is_empty() {
            return;
        }

        let drain = futures_util::future::join_all(handles);
        if tokio::time::timeout(grace, drain).await.is_err() {
            error!(
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed with tasks still in flight"
            );
            for task in &tasks {
                if task.stats.is_running() {
                    task.stats.mark_stopped();
                }
            }
        }
        info!("scheduler stopped");
    }

    /// Cancel the scheduler without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether execution was enabled by configuration.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    pub(crate) fn allowlist(&self) -> Vec<String> {
        self.state.lock().unwrap().allowlist.clone()
    }

    /// Consistent read-only snapshot of every task plus aggregate counts.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.state.lock().unwrap();
        let tasks: Vec<TaskSnapshot> = state
            .tasks
            .iter()
            .map(|t| t.stats.snapshot(&t.id, &t.schedule))
            .collect();
        let running = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .count();
        SchedulerSnapshot {
            enabled: state.enabled,
            total_tasks: tasks.len(),
            running_tasks: running,
            tasks,
        }
    }
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self::new()
    }
}
