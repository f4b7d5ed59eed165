use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current state of one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for its next slot.
    Pending,
    /// An execution is in flight.
    Running,
    /// The scheduler stopped the task (shutdown, or never started).
    Stopped,
    /// The most recent execution failed.
    Error,
}

#[derive(Debug)]
struct StatsInner {
    executions: u64,
    failures: u64,
    last_start: Option<DateTime<Utc>>,
    last_duration: Option<Duration>,
    total_duration: Duration,
    status: TaskStatus,
}

/// Per-task runtime statistics.
///
/// Written only from the task's own execution context; external readers
/// take consistent snapshots through the brief internal mutex.
#[derive(Clone)]
pub struct TaskStats {
    inner: Arc<Mutex<StatsInner>>,
}

impl TaskStats {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                executions: 0,
                failures: 0,
                last_start: None,
                last_duration: None,
                total_duration: Duration::ZERO,
                status: TaskStatus::Stopped,
            })),
        }
    }

    pub(crate) fn mark_pending(&self) {
        self.inner.lock().unwrap().status = TaskStatus::Pending;
    }

    pub(crate) fn mark_start(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = TaskStatus::Running;
        inner.last_start = Some(Utc::now());
    }

    pub(crate) fn mark_success(&self, duration: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.executions += 1;
        inner.last_duration = Some(duration);
        inner.total_duration += duration;
        inner.status = TaskStatus::Pending;
    }

    pub(crate) fn mark_failure(&self, duration: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.executions += 1;
        inner.failures += 1;
        inner.last_duration = Some(duration);
        inner.total_duration += duration;
        inner.status = TaskStatus::Error;
    }

    pub(crate) fn mark_stopped(&self) {
        self.inner.lock().unwrap().status = TaskStatus::Stopped;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.inner.lock().unwrap().status == TaskStatus::Running
    }

    pub fn snapshot(&self, id: &str, schedule: &str) -> TaskSnapshot {
        let inner = self.inner.lock().unwrap();
        let mean = if inner.executions > 0 {
            Some(inner.total_duration.as_millis() as u64 / inner.executions)
        } else {
            None
        };
        TaskSnapshot {
            id: id.to_string(),
            schedule: schedule.to_string(),
            executions: inner.executions,
            failures: inner.failures,
            last_start: inner.last_start,
            last_duration_ms: inner.last_duration.map(|d| d.as_millis() as u64),
            mean_duration_ms: mean,
            status: inner.status,
        }
    }
}

/// Read-only view of one task's statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub schedule: String,
    pub executions: u64,
    pub failures: u64,
    pub last_start: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub mean_duration_ms: Option<u64>,
    pub status: TaskStatus,
}

/// Aggregate scheduler view exposed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub enabled: bool,
    pub total_tasks: usize,
    pub running_tasks: usize,
    pub tasks: Vec<TaskSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_updates_counts_and_mean() {
        let stats = TaskStats::new();
        stats.mark_start();
        stats.mark_success(Duration::from_millis(100));
        stats.mark_start();
        stats.mark_success(Duration::from_millis(300));

        let snap = stats.snapshot("T.tick", "every 100ms");
        assert_eq!(snap.executions, 2);
        assert_eq!(snap.failures, 0);
        assert_eq!(snap.mean_duration_ms, Some(200));
        assert_eq!(snap.last_duration_ms, Some(300));
        assert_eq!(snap.status, TaskStatus::Pending);
        assert!(snap.last_start.is_some());
    }

    #[test]
    fn failure_sets_error_status() {
        let stats = TaskStats::new();
        stats.mark_start();
        stats.mark_failure(Duration::from_millis(10));

        let snap = stats.snapshot("T.tick", "every 100ms");
        assert_eq!(snap.executions, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.status, TaskStatus::Error);
    }

    #[test]
    fn running_flag_tracks_in_flight() {
        let stats = TaskStats::new();
        assert!(!stats.is_running());
        stats.mark_start();
        assert!(stats.is_running());
        stats.mark_success(Duration::ZERO);
        assert!(!stats.is_running());
    }
}
