//! Scheduled-task declarations.
//!
//! These are pure data types living in `mitsuki-core` so that component
//! descriptors can carry task declarations without depending on
//! `mitsuki-scheduler`. The scheduler runtime converts a [`TriggerSpec`]
//! into its internal trigger representation when the application starts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::container::{BoxError, Instance};

/// How a scheduled task should be triggered.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSpec {
    /// Start executions on a fixed time grid (e.g. every 60 seconds).
    /// An execution that overruns its next slot skips that slot; at most
    /// one execution per task is ever in flight.
    FixedRate {
        interval: Duration,
        initial_delay: Duration,
    },
    /// Wait a fixed delay between the end of one execution and the start
    /// of the next.
    FixedDelay {
        delay: Duration,
        initial_delay: Duration,
    },
    /// Run on a six-field cron expression, evaluated in the given
    /// time-zone identifier (empty string = UTC).
    Cron {
        expression: String,
        timezone: String,
    },
}

impl TriggerSpec {
    /// Fixed-rate trigger with no initial delay.
    pub fn every(interval: Duration) -> Self {
        TriggerSpec::FixedRate {
            interval,
            initial_delay: Duration::ZERO,
        }
    }

    /// Fixed-delay trigger with no initial delay.
    pub fn delay(delay: Duration) -> Self {
        TriggerSpec::FixedDelay {
            delay,
            initial_delay: Duration::ZERO,
        }
    }

    /// Cron trigger evaluated in UTC.
    pub fn cron(expression: impl Into<String>) -> Self {
        TriggerSpec::Cron {
            expression: expression.into(),
            timezone: String::new(),
        }
    }

    /// Cron trigger evaluated in the given tz-database zone.
    pub fn cron_in(expression: impl Into<String>, timezone: impl Into<String>) -> Self {
        TriggerSpec::Cron {
            expression: expression.into(),
            timezone: timezone.into(),
        }
    }
}

/// Type-erased task body: receives the owning component instance.
pub type TaskFn = Arc<
    dyn Fn(Instance) -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> + Send + Sync,
>;

/// A single scheduled task declared on a component.
///
/// The scheduler derives the task id as `"<ComponentName>.<method>"`.
#[derive(Clone)]
pub struct ScheduledTaskSpec {
    pub method: &'static str,
    pub trigger: TriggerSpec,
    pub run: TaskFn,
}

impl ScheduledTaskSpec {
    /// Declare a task whose body runs against a clone of the component.
    pub fn new<C, F, Fut, R>(method: &'static str, trigger: TriggerSpec, body: F) -> Self
    where
        C: Clone + Send + Sync + 'static,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoTaskResult,
    {
        let run: TaskFn = Arc::new(
            move |instance: Instance| -> Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>> {
                match instance.downcast_ref::<C>().cloned() {
                    Some(c) => {
                        let fut = body(c);
                        Box::pin(async move { fut.await.into_task_result() })
                    }
                    None => Box::pin(async move {
                        Err(format!(
                            "scheduled task target is not a `{}`",
                            std::any::type_name::<C>()
                        )
                        .into())
                    }),
                }
            },
        );
        Self {
            method,
            trigger,
            run,
        }
    }
}

impl std::fmt::Debug for ScheduledTaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTaskSpec")
            .field("method", &self.method)
            .field("trigger", &self.trigger)
            .finish()
    }
}

/// Trait for components that declare periodic tasks.
pub trait Scheduled: Clone + Send + Sync + 'static {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec>;
}

/// Conversion for scheduled task return values.
///
/// Task bodies may return `()` (infallible) or `Result<(), E>`; errors are
/// recorded as failures by the scheduler and never stop the loop.
pub trait IntoTaskResult {
    fn into_task_result(self) -> Result<(), BoxError>;
}

impl IntoTaskResult for () {
    fn into_task_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> IntoTaskResult for Result<(), E>
where
    E: Into<BoxError>,
{
    fn into_task_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}
