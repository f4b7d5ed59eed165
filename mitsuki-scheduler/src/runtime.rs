use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::FutureExt;
use mitsuki_core::container::Instance;
use mitsuki_core::scheduling::TaskFn;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::stats::TaskStats;
use crate::trigger::Trigger;

/// One scheduled task, bound to its resolved component instance.
pub(crate) struct Task {
    pub id: String,
    pub trigger: Trigger,
    pub schedule: String,
    pub run: TaskFn,
    pub instance: Instance,
    pub stats: TaskStats,
}

/// Spawn the task's time loop.
///
/// The execution is awaited inline inside the loop, so at most one
/// execution per task is ever in flight; a cancelled token stops new
/// starts but never interrupts a running execution.
pub(crate) fn spawn(task: Arc<Task>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        task.stats.mark_pending();
        match &task.trigger {
            Trigger::FixedRate {
                interval,
                initial_delay,
            } => {
                if !sleep_cancellable(*initial_delay, &cancel).await {
                    task.stats.mark_stopped();
                    return;
                }
                let mut ticker = tokio::time::interval(*interval);
                // A slow execution skips its missed slot; the grid re-bases
                // at the late tick instead of firing twice.
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => run_once(&task).await,
                    }
                }
            }
            Trigger::FixedDelay {
                delay,
                initial_delay,
            } => {
                if !sleep_cancellable(*initial_delay, &cancel).await {
                    task.stats.mark_stopped();
                    return;
                }
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    run_once(&task).await;
                    if !sleep_cancellable(*delay, &cancel).await {
                        break;
                    }
                }
            }
            Trigger::Cron { .. } => loop {
                let Some(next) = task.trigger.next_after(Utc::now()) else {
                    debug!(task = %task.id, "cron schedule exhausted");
                    break;
                };
                let wait = (next - Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                if !sleep_cancellable(wait, &cancel).await {
                    break;
                }
                run_once(&task).await;
            },
        }
        task.stats.mark_stopped();
    })
}

/// Sleep unless cancelled; returns `false` when the token fired first.
async fn sleep_cancellable(duration: std::time::Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Execute the task body once, recording statistics. Panics and `Err`
/// returns are failures; neither stops the loop.
async fn run_once(task: &Task) {
    task.stats.mark_start();
    let started = Instant::now();
    let outcome = AssertUnwindSafe((task.run)(task.instance.clone()))
        .catch_unwind()
        .await;
    let elapsed = started.elapsed();
    match outcome {
        Ok(Ok(())) => {
            task.stats.mark_success(elapsed);
            debug!(task = %task.id, duration_ms = elapsed.as_millis() as u64, "task completed");
        }
        Ok(Err(e)) => {
            task.stats.mark_failure(elapsed);
            error!(task = %task.id, error = %e, "scheduled task failed");
        }
        Err(_) => {
            task.stats.mark_failure(elapsed);
            error!(task = %task.id, "scheduled task panicked");
        }
    }
}
