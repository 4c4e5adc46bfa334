//! Orchestrator behavior across dispatches, windows, delays and shutdown.

mod common;

use chrono::{Local, NaiveTime, TimeZone};
use common::{wait_until, Behavior, CountingProvider, RecordingTask, WedgedTask, WAIT};
use periodic_task_host::periodic::{
    ManualClock, MemoryLogger, Orchestrator, PeriodicTask, StaticTaskProvider, StopSummary,
    TaskLogger,
};
use std::sync::Arc;
use std::time::Duration;

fn logger() -> Arc<MemoryLogger> {
    Arc::new(MemoryLogger::new())
}

fn orchestrator(tasks: Vec<Arc<dyn PeriodicTask>>) -> Orchestrator {
    Orchestrator::new(Arc::new(StaticTaskProvider::new(tasks)))
}

fn idle(orchestrator: &Orchestrator) -> bool {
    orchestrator.tasks().iter().all(|t| !t.is_processing())
}

#[test]
fn test_startup_dispatch_only_runs_startup_critical_tasks() {
    let critical = Arc::new(RecordingTask::new("critical", -10));
    let also_critical = Arc::new(RecordingTask::new("also-critical", -1));
    let regular = Arc::new(RecordingTask::new("regular", 0));
    let late = Arc::new(RecordingTask::new("late", 100));
    let orchestrator = orchestrator(vec![
        regular.clone(),
        late.clone(),
        critical.clone(),
        also_critical.clone(),
    ]);
    let log = logger();

    let launched = orchestrator.start_tasks(log.clone(), true);
    assert_eq!(launched, 2);
    assert!(wait_until(WAIT, || idle(&orchestrator)));

    assert_eq!(critical.runs(), 1);
    assert_eq!(also_critical.runs(), 1);
    assert_eq!(regular.runs(), 0);
    assert_eq!(late.runs(), 0);
    assert!(log.contains("Starting 2 tasks."));
    assert!(log.contains("2 tasks started."));

    // Regular ticks consider every enabled task
    let launched = orchestrator.start_tasks(log.clone(), false);
    assert_eq!(launched, 4);
    assert!(wait_until(WAIT, || idle(&orchestrator)));
    assert_eq!(critical.runs(), 2);
    assert_eq!(regular.runs(), 1);
    assert_eq!(late.runs(), 1);
}

#[test]
fn test_dispatch_follows_registry_order() {
    let orchestrator = orchestrator(vec![
        Arc::new(RecordingTask::new("third", 50)),
        Arc::new(RecordingTask::new("first", -3)),
        Arc::new(RecordingTask::new("second", 50)),
    ]);
    orchestrator.start_tasks(logger(), false);

    let names: Vec<&str> = orchestrator.tasks().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["first", "third", "second"]);
}

#[test]
fn test_registry_is_built_once() {
    let provider = Arc::new(CountingProvider::new(vec![Arc::new(RecordingTask::new(
        "only", 1,
    ))]));
    let orchestrator = Orchestrator::new(provider.clone());
    let log = logger();

    orchestrator.start_tasks(log.clone(), true);
    orchestrator.start_tasks(log.clone(), false);
    orchestrator.start_tasks(log.clone(), false);

    assert_eq!(provider.calls(), 1);
    assert_eq!(orchestrator.tasks().len(), 1);
}

#[test]
fn test_disabled_and_out_of_window_tasks_are_skipped() {
    let clock = Arc::new(ManualClock::new(
        Local.with_ymd_and_hms(2024, 6, 12, 8, 59, 59).unwrap(),
    ));
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let morning = Arc::new(RecordingTask::new("morning", 1).window(Some(nine), None));
    let disabled = Arc::new(RecordingTask::new("disabled", 1).disabled());
    let orchestrator = orchestrator(vec![morning.clone(), disabled.clone()])
        .with_clock(clock.clone());
    let log = logger();

    assert_eq!(orchestrator.start_tasks(log.clone(), false), 0);

    clock.set(Local.with_ymd_and_hms(2024, 6, 12, 9, 0, 0).unwrap());
    assert_eq!(orchestrator.start_tasks(log.clone(), false), 1);
    assert!(wait_until(WAIT, || idle(&orchestrator)));

    assert_eq!(morning.runs(), 1);
    assert_eq!(disabled.runs(), 0);
}

#[test]
fn test_exec_delay_spaces_out_runs() {
    let clock = Arc::new(ManualClock::new(
        Local.with_ymd_and_hms(2024, 6, 12, 12, 0, 0).unwrap(),
    ));
    let task = Arc::new(RecordingTask::new("spaced", 1).exec_delay(Duration::from_secs(120)));
    let orchestrator = orchestrator(vec![task.clone()]).with_clock(clock.clone());
    let log = logger();

    assert_eq!(orchestrator.start_tasks(log.clone(), false), 1);
    assert!(wait_until(WAIT, || idle(&orchestrator)));

    clock.advance(chrono::Duration::seconds(119));
    assert_eq!(orchestrator.start_tasks(log.clone(), false), 0);

    clock.advance(chrono::Duration::seconds(1));
    assert_eq!(orchestrator.start_tasks(log.clone(), false), 1);
    assert!(wait_until(WAIT, || idle(&orchestrator)));

    assert_eq!(task.runs(), 2);
}

#[test]
fn test_running_task_is_not_relaunched() {
    let (wedged, started, release) = WedgedTask::new("wedged", 1);
    let orchestrator = orchestrator(vec![Arc::new(wedged)]);
    let log = logger();

    assert_eq!(orchestrator.start_tasks(log.clone(), false), 1);
    started.recv_timeout(WAIT).unwrap();

    assert_eq!(orchestrator.start_tasks(log.clone(), false), 0);
    assert_eq!(orchestrator.tasks()[0].state().run_count, 1);

    release.send(()).unwrap();
    assert!(wait_until(WAIT, || idle(&orchestrator)));
}

#[test]
fn test_failing_task_does_not_affect_others() {
    let failing = Arc::new(RecordingTask::new("failing", 1).behavior(Behavior::Fail));
    let healthy = Arc::new(RecordingTask::new("healthy", 2).behavior(Behavior::Items(3)));
    let orchestrator = orchestrator(vec![failing.clone(), healthy.clone()]);
    let log = logger();

    assert_eq!(orchestrator.start_tasks(log.clone(), false), 2);
    assert!(wait_until(WAIT, || idle(&orchestrator)));

    assert_eq!(failing.items(), 1);
    assert_eq!(healthy.items(), 3);

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, "failing");
    assert_eq!(errors[0].error.as_deref(), Some("Execution failed: item 1 broke"));

    // Still schedulable after the failure
    assert_eq!(orchestrator.start_tasks(log.clone(), false), 2);
    assert!(wait_until(WAIT, || idle(&orchestrator)));
    assert_eq!(failing.runs(), 2);
}

#[test]
fn test_stop_tasks_waits_for_running_tasks() {
    let looping = Arc::new(RecordingTask::new("looping", 1).behavior(Behavior::UntilCancelled));
    let quick = Arc::new(RecordingTask::new("quick", 2));
    let orchestrator = orchestrator(vec![looping.clone(), quick.clone()]);
    let log = logger();

    orchestrator.start_tasks(log.clone(), false);
    assert!(wait_until(WAIT, || looping.items() >= 2));
    assert!(wait_until(WAIT, || !orchestrator.task("quick").unwrap().is_processing()));

    let summary = orchestrator.stop_tasks(log.as_ref());

    assert_eq!(
        summary,
        StopSummary {
            stopped: 1,
            idle: 1,
            timed_out: 0,
            failed: 0,
        }
    );
    assert!(idle(&orchestrator));
    assert!(log.contains("Stopping task looping processing."));
    assert!(log.contains("looping stopped."));

    // Stopped tasks are not started again
    assert_eq!(orchestrator.start_tasks(log.clone(), false), 0);
}

#[test]
fn test_wedged_task_does_not_block_stopping_the_others() {
    let (wedged, started, release) = WedgedTask::new("wedged", 1);
    let looping = Arc::new(RecordingTask::new("looping", 2).behavior(Behavior::UntilCancelled));
    let orchestrator = orchestrator(vec![Arc::new(wedged), looping.clone()])
        .with_stop_timeout(Some(Duration::from_millis(100)));
    let log = logger();

    orchestrator.start_tasks(log.clone(), false);
    started.recv_timeout(WAIT).unwrap();
    assert!(wait_until(WAIT, || looping.runs() == 1));

    let summary = orchestrator.stop_tasks(log.as_ref());

    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.stopped, 1);
    assert!(!orchestrator.task("looping").unwrap().is_processing());
    assert!(orchestrator.task("wedged").unwrap().is_processing());
    assert!(log.contains("wedged did not stop in time."));

    release.send(()).unwrap();
    assert!(wait_until(WAIT, || idle(&orchestrator)));
}

#[test]
fn test_closure_logger_receives_lifecycle_events() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    let logger: Arc<dyn TaskLogger> = Arc::new(
        move |category: &str, message: &str, _: Option<&(dyn std::error::Error + 'static)>| {
            sink.lock().unwrap().push(format!("{}|{}", category, message));
        },
    );
    let orchestrator = orchestrator(vec![Arc::new(RecordingTask::new("solo", -1))]);

    orchestrator.start_tasks(logger, true);
    assert!(wait_until(WAIT, || idle(&orchestrator)));

    let seen = seen.lock().unwrap();
    assert!(seen.iter().any(|l| l == "Tasks start|Starting 1 tasks."));
    assert!(seen
        .iter()
        .any(|l| l.starts_with("solo|Execution started @")));
    assert!(seen.iter().any(|l| l.starts_with("solo|Execution ended @")));
}
