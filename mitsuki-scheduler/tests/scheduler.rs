use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mitsuki_core::config::ConfigStore;
use mitsuki_core::container::{
    BoxError, Component, ComponentContext, ComponentRegistry, Container, DependencyRequest,
};
use mitsuki_core::scheduling::{Scheduled, ScheduledTaskSpec, TriggerSpec};
use mitsuki_scheduler::{SchedulerHandle, TaskStatus};

// ── Shared probe ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Probe {
    starts: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Probe {
    fn enter(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

macro_rules! probe_component {
    ($name:ident, $param:literal) => {
        #[derive(Clone)]
        struct $name {
            probe: Probe,
        }

        impl Component for $name {
            fn dependencies() -> Vec<DependencyRequest> {
                vec![DependencyRequest::named::<Probe>("probe", $param)]
            }
            fn construct(ctx: &ComponentContext) -> Result<Self, BoxError> {
                Ok(Self {
                    probe: ctx.component("probe")?,
                })
            }
        }
    };
}

async fn build_container(
    registry: ComponentRegistry,
    enabled: bool,
    extra_yaml: &str,
) -> Container {
    let yaml = format!("mitsuki:\n  scheduler:\n    enabled: {enabled}\n{extra_yaml}");
    let config = ConfigStore::from_yaml_str(&yaml, "").unwrap();
    Container::resolve(registry, Arc::new(config)).await.unwrap()
}

async fn start<T: Component + Scheduled>(probe: Probe, enabled: bool) -> SchedulerHandle {
    let mut registry = ComponentRegistry::new();
    registry.provide("probe", probe);
    registry.register_scheduled::<T>();
    let container = build_container(registry, enabled, "").await;
    let handle = SchedulerHandle::new();
    handle.start(&container).await.unwrap();
    handle
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ── Fixed rate ──────────────────────────────────────────────────────────────

probe_component!(FastRate, "probe");

impl Scheduled for FastRate {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "tick",
            TriggerSpec::every(Duration::from_millis(100)),
            |c: FastRate| async move {
                c.probe.enter();
                c.probe.exit();
            },
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn fixed_rate_runs_on_the_grid() {
    let probe = Probe::default();
    let _handle = start::<FastRate>(probe.clone(), true).await;

    sleep_ms(350).await;
    // First tick immediate, then at 100, 200, 300.
    let count = probe.count();
    assert!(count >= 3, "expected >= 3 executions, got {count}");
}

probe_component!(SlowRate, "probe");

impl Scheduled for SlowRate {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "churn",
            TriggerSpec::every(Duration::from_millis(100)),
            |c: SlowRate| async move {
                c.probe.enter();
                tokio::time::sleep(Duration::from_millis(250)).await;
                c.probe.exit();
            },
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn fixed_rate_overrun_skips_missed_slots() {
    let probe = Probe::default();
    let handle = start::<SlowRate>(probe.clone(), true).await;

    sleep_ms(1000).await;

    // 100ms grid, 250ms body: starts at 0, 250, 500, 750. Missed slots
    // are skipped, never duplicated.
    let count = probe.count();
    assert!((4..=5).contains(&count), "expected 4..=5 starts, got {count}");
    assert_eq!(
        probe.max_in_flight.load(Ordering::SeqCst),
        1,
        "at most one execution may be in flight"
    );

    let snapshot = handle.snapshot();
    let task = &snapshot.tasks[0];
    assert_eq!(task.id, "SlowRate.churn");
    assert_eq!(task.failures, 0);
    assert!(
        task.executions as usize >= count - 1,
        "stats should track completed executions"
    );
}

probe_component!(DelayedStart, "probe");

impl Scheduled for DelayedStart {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "tick",
            TriggerSpec::FixedRate {
                interval: Duration::from_millis(100),
                initial_delay: Duration::from_millis(200),
            },
            |c: DelayedStart| async move {
                c.probe.enter();
                c.probe.exit();
            },
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn initial_delay_defers_first_start() {
    let probe = Probe::default();
    let _handle = start::<DelayedStart>(probe.clone(), true).await;

    sleep_ms(150).await;
    assert_eq!(probe.count(), 0, "must not run during the initial delay");

    sleep_ms(100).await;
    assert!(probe.count() >= 1, "should run after the delay");
}

// ── Fixed delay ─────────────────────────────────────────────────────────────

probe_component!(DelaySpacing, "probe");

impl Scheduled for DelaySpacing {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "tick",
            TriggerSpec::delay(Duration::from_millis(100)),
            |c: DelaySpacing| async move {
                c.probe.enter();
                tokio::time::sleep(Duration::from_millis(50)).await;
                c.probe.exit();
            },
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn fixed_delay_spaces_from_completion() {
    let probe = Probe::default();
    let _handle = start::<DelaySpacing>(probe.clone(), true).await;

    // 50ms body + 100ms delay: starts at 0, 150, 300, 450.
    sleep_ms(500).await;
    let count = probe.count();
    assert!((3..=4).contains(&count), "expected 3..=4 starts, got {count}");
}

// ── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancel_stops_future_starts() {
    let probe = Probe::default();
    let handle = start::<FastRate>(probe.clone(), true).await;

    sleep_ms(250).await;
    let before = probe.count();
    assert!(before >= 2);

    handle.cancel();
    tokio::task::yield_now().await;
    let frozen = probe.count();
    sleep_ms(300).await;
    assert_eq!(probe.count(), frozen, "no starts after cancellation");
}

#[tokio::test(start_paused = true)]
async fn stop_marks_tasks_stopped() {
    let probe = Probe::default();
    let handle = start::<FastRate>(probe.clone(), true).await;

    sleep_ms(150).await;
    handle.stop().await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.tasks[0].status, TaskStatus::Stopped);
    assert_eq!(snapshot.running_tasks, 0);
}

// ── Failure isolation ───────────────────────────────────────────────────────

probe_component!(Failing, "failProbe");

impl Scheduled for Failing {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "explode",
            TriggerSpec::every(Duration::from_millis(100)),
            |c: Failing| async move {
                c.probe.enter();
                c.probe.exit();
                Err::<(), String>("boom".into())
            },
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn failures_never_stop_the_loop_or_other_tasks() {
    let healthy = Probe::default();
    let failing = Probe::default();

    let mut registry = ComponentRegistry::new();
    registry.provide("probe", healthy.clone());
    registry.provide("failProbe", failing.clone());
    registry.register_scheduled::<FastRate>();
    registry.register_scheduled::<Failing>();
    let container = build_container(registry, true, "").await;
    let handle = SchedulerHandle::new();
    handle.start(&container).await.unwrap();

    sleep_ms(350).await;

    assert!(failing.count() >= 3, "failing task keeps scheduling");
    assert!(healthy.count() >= 3, "healthy task unaffected");

    let snapshot = handle.snapshot();
    let failing_task = snapshot
        .tasks
        .iter()
        .find(|t| t.id == "Failing.explode")
        .unwrap();
    assert!(failing_task.failures >= 3);
    assert_eq!(failing_task.status, TaskStatus::Error);

    let healthy_task = snapshot
        .tasks
        .iter()
        .find(|t| t.id == "FastRate.tick")
        .unwrap();
    assert_eq!(healthy_task.failures, 0);
}

probe_component!(Panicking, "probe");

impl Scheduled for Panicking {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new::<_, _, _, ()>(
            "panic",
            TriggerSpec::every(Duration::from_millis(100)),
            |c: Panicking| async move {
                c.probe.enter();
                c.probe.exit();
                panic!("intentional panic");
            },
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn panics_recorded_as_failures_and_loop_survives() {
    let probe = Probe::default();
    let handle = start::<Panicking>(probe.clone(), true).await;

    sleep_ms(350).await;

    assert!(probe.count() >= 3, "loop must survive panics");
    let snapshot = handle.snapshot();
    assert!(snapshot.tasks[0].failures >= 3);
}

// ── Disabled scheduler ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn disabled_scheduler_discovers_but_never_runs() {
    let probe = Probe::default();
    let handle = start::<FastRate>(probe.clone(), false).await;

    sleep_ms(500).await;
    assert_eq!(probe.count(), 0);

    let snapshot = handle.snapshot();
    assert!(!snapshot.enabled);
    assert_eq!(snapshot.total_tasks, 1);
    assert_eq!(snapshot.tasks[0].id, "FastRate.tick");
    assert_eq!(snapshot.tasks[0].status, TaskStatus::Stopped);
}

// ── Grace period ────────────────────────────────────────────────────────────

probe_component!(LongRunner, "probe");

impl Scheduled for LongRunner {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "crawl",
            TriggerSpec::every(Duration::from_millis(100)),
            |c: LongRunner| async move {
                c.probe.enter();
                tokio::time::sleep(Duration::from_millis(60_000)).await;
                c.probe.exit();
            },
        )]
    }
}

#[tokio::test(start_paused = true)]
async fn stop_gives_up_after_grace_period() {
    let probe = Probe::default();
    let mut registry = ComponentRegistry::new();
    registry.provide("probe", probe.clone());
    registry.register_scheduled::<LongRunner>();
    let container = build_container(
        registry,
        true,
        "    grace-period-ms: 100\n",
    )
    .await;
    let handle = SchedulerHandle::new();
    handle.start(&container).await.unwrap();

    sleep_ms(10).await;
    assert_eq!(probe.count(), 1, "task should be mid-flight");

    handle.stop().await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.tasks[0].status, TaskStatus::Stopped);
}

// ── Validation ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct BadCron;

impl Component for BadCron {
    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(BadCron)
    }
}

impl Scheduled for BadCron {
    fn scheduled_tasks() -> Vec<ScheduledTaskSpec> {
        vec![ScheduledTaskSpec::new(
            "never",
            TriggerSpec::cron("definitely not cron"),
            |_: BadCron| async move {},
        )]
    }
}

#[tokio::test]
async fn invalid_cron_aborts_scheduler_start() {
    let mut registry = ComponentRegistry::new();
    registry.register_scheduled::<BadCron>();
    let container = build_container(registry, true, "").await;
    let handle = SchedulerHandle::new();
    assert!(handle.start(&container).await.is_err());
}
