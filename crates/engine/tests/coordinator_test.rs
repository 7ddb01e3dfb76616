//! Integration tests for TaskCoordinator
//!
//! Every test drives real worker threads; waits are bounded by `recv_timeout`
//! so a lifecycle bug fails the test instead of hanging it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use taskgrid_engine::prelude::*;

const DEADLINE: Duration = Duration::from_secs(10);

fn config(n_workers: usize) -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_name("it")
        .with_workers(n_workers)
        .with_poll_interval(Duration::from_millis(1))
        .with_drain_timeout(DEADLINE)
}

fn identity() -> TaskFunction<u64, u64> {
    TaskFunction::new("identity", |x: &u64| Ok(*x))
}

/// Collect events until `n` results have arrived
fn collect_results(
    events: &Receiver<EngineEvent<u64, u64>>,
    n: usize,
) -> (Vec<(u64, TaskOutcome<u64>)>, Vec<f64>) {
    let mut results = Vec::with_capacity(n);
    let mut progress = Vec::new();
    while results.len() < n {
        match events.recv_timeout(DEADLINE).expect("timed out waiting for results") {
            EngineEvent::Result { task, outcome } => results.push((task, outcome)),
            EngineEvent::Progress(p) => progress.push(p),
            EngineEvent::Finished => panic!("finished before all results arrived"),
        }
    }
    (results, progress)
}

/// Poll `condition` until it holds or the deadline passes
fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + DEADLINE;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Stop, then count Finished events until the stream goes quiet
fn stop_and_count_finished(coordinator: &TaskCoordinator<u64, u64>) -> usize {
    let events = coordinator.events();
    coordinator.stop();
    assert!(coordinator.wait_for_finish(DEADLINE));

    let mut finished = 0;
    while let Ok(event) = events.recv_timeout(Duration::from_millis(50)) {
        if event.is_finished() {
            finished += 1;
        }
    }
    finished
}

#[test_log::test]
fn test_every_task_yields_exactly_one_result() {
    let coordinator = TaskCoordinator::with_function(config(4), identity()).unwrap();
    let events = coordinator.events();

    coordinator.submit_many(0..100).unwrap();
    coordinator.start().unwrap();

    let (results, progress) = collect_results(&events, 100);
    let tasks: HashSet<u64> = results.iter().map(|(task, _)| *task).collect();
    assert_eq!(tasks, (0..100).collect::<HashSet<_>>());
    assert!(results.iter().all(|(task, outcome)| outcome == &Ok(*task)));

    // Result then Progress per item
    let last = match events.recv_timeout(DEADLINE).unwrap() {
        EngineEvent::Progress(p) => p,
        other => panic!("expected progress, got {other:?}"),
    };
    assert_eq!(progress.len(), 99);
    assert_eq!(last, 1.0);

    assert_eq!(stop_and_count_finished(&coordinator), 1);
    let stats = coordinator.stats();
    assert_eq!(stats.submitted, 100);
    assert_eq!(stats.dispatched, 100);
    assert_eq!(stats.completed, 100);
    assert_eq!(stats.failed, 0);
}

#[test]
fn test_progress_is_monotonic_with_late_submissions() {
    let coordinator = TaskCoordinator::with_function(
        config(2),
        TaskFunction::new("slow", |x: &u64| {
            thread::sleep(Duration::from_millis(2));
            Ok(*x)
        }),
    )
    .unwrap();
    let events = coordinator.events();

    coordinator.submit_many(0..20).unwrap();
    coordinator.start().unwrap();
    thread::sleep(Duration::from_millis(10));
    coordinator.submit_many(20..40).unwrap();

    let mut observed = Vec::new();
    let mut results = 0;
    while results < 40 {
        match events.recv_timeout(DEADLINE).unwrap() {
            EngineEvent::Result { .. } => results += 1,
            EngineEvent::Progress(p) => observed.push(p),
            EngineEvent::Finished => panic!("unexpected finish"),
        }
    }
    if let Ok(EngineEvent::Progress(p)) = events.recv_timeout(DEADLINE) {
        observed.push(p);
    }

    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");
    assert!(observed.iter().all(|p| (0.0..=1.0).contains(p)));
    assert_eq!(observed.last().copied(), Some(1.0));
    coordinator.stop();
}

#[test]
fn test_progress_holds_at_one_after_late_submissions() {
    let coordinator = TaskCoordinator::with_function(config(1), identity()).unwrap();
    let events = coordinator.events();

    coordinator.submit(0).unwrap();
    coordinator.start().unwrap();
    let (_, progress) = collect_results(&events, 1);
    if let Ok(EngineEvent::Progress(p)) = events.recv_timeout(DEADLINE) {
        assert_eq!(p, 1.0);
    }
    assert!(progress.iter().all(|p| *p <= 1.0));

    coordinator.submit_many(1..3).unwrap();
    let mut held = Vec::new();
    let mut results = 0;
    while results < 2 {
        match events.recv_timeout(DEADLINE).unwrap() {
            EngineEvent::Result { .. } => results += 1,
            EngineEvent::Progress(p) => held.push(p),
            EngineEvent::Finished => panic!("unexpected finish"),
        }
    }
    assert!(held.iter().all(|p| *p == 1.0), "{held:?}");
    coordinator.stop();
}

#[test]
fn test_single_worker_preserves_order() {
    let coordinator = TaskCoordinator::with_function(config(1), identity()).unwrap();
    let events = coordinator.events();

    coordinator.submit_many(0..50).unwrap();
    coordinator.start().unwrap();

    let (results, _) = collect_results(&events, 50);
    let order: Vec<u64> = results.into_iter().map(|(task, _)| task).collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
    coordinator.stop();
}

#[test]
fn test_stop_is_idempotent() {
    let coordinator = TaskCoordinator::with_function(config(3), identity()).unwrap();
    coordinator.submit_many(0..10).unwrap();
    coordinator.start().unwrap();

    coordinator.stop();
    coordinator.stop();
    assert!(coordinator.wait_for_finish(DEADLINE));
    coordinator.stop();

    let events = coordinator.events();
    let finished = events.try_iter().filter(EngineEvent::is_finished).count();
    assert_eq!(finished, 1);
    assert!(!coordinator.is_running());
    assert!(!coordinator.is_active());
    assert!(coordinator.is_finished());
}

#[test]
fn test_stop_without_start_finishes() {
    let coordinator = TaskCoordinator::with_function(config(2), identity()).unwrap();
    coordinator.submit_many(0..5).unwrap();
    assert_eq!(stop_and_count_finished(&coordinator), 1);
    assert_eq!(coordinator.stats().dispatched, 0);
}

#[test_log::test]
fn test_suspend_then_resume_delivers_everything() {
    let release = Arc::new(AtomicBool::new(false));
    let held = Arc::clone(&release);
    let coordinator = TaskCoordinator::with_function(
        config(2),
        TaskFunction::new("held", move |x: &u64| {
            while !held.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(*x)
        }),
    )
    .unwrap();
    let events = coordinator.events();

    // Tasks 10.. wait behind the gate until it is lifted after the resume
    let lifted = Arc::new(AtomicBool::new(false));
    let gate_lifted = Arc::clone(&lifted);
    coordinator.set_dispatch_gate(move |task: &u64| *task < 10 || gate_lifted.load(Ordering::SeqCst));

    coordinator.submit_many(0..30).unwrap();
    coordinator.start().unwrap();
    wait_until(|| coordinator.stats().dispatched == 10);

    coordinator.suspend();
    assert!(!coordinator.is_running());
    release.store(true, Ordering::SeqCst);
    assert!(coordinator.wait_until_idle(DEADLINE));

    // In-flight tasks finished; the rest waited in the backlog
    let drained: Vec<u64> = events
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::Result { task, .. } => Some(task),
            _ => None,
        })
        .collect();
    assert_eq!(drained.len(), 10);
    assert_eq!(coordinator.pending(), 20);

    lifted.store(true, Ordering::SeqCst);
    coordinator.start().unwrap();
    let (rest, _) = collect_results(&events, 20);

    let all: HashSet<u64> = drained
        .into_iter()
        .chain(rest.into_iter().map(|(task, _)| task))
        .collect();
    assert_eq!(all, (0..30).collect::<HashSet<_>>());
    assert_eq!(coordinator.stats().pools_spawned, 2);
    coordinator.stop();
}

#[test]
fn test_set_function_mid_drain_clears_backlog() {
    let coordinator = TaskCoordinator::with_function(
        config(2),
        TaskFunction::new("slow", |x: &u64| {
            thread::sleep(Duration::from_millis(5));
            Ok(*x)
        }),
    )
    .unwrap();
    let events = coordinator.events();
    coordinator.set_dispatch_gate(|task: &u64| *task < 10);

    coordinator.submit_many(0..200).unwrap();
    coordinator.start().unwrap();
    wait_until(|| coordinator.stats().dispatched == 10);

    coordinator
        .set_function(TaskFunction::new("plus-1000", |x: &u64| Ok(x + 1000)))
        .unwrap();
    assert_eq!(coordinator.pending(), 0);
    assert_eq!(coordinator.progress(), (0, 0));
    assert!(coordinator.is_running());

    let before: Vec<u64> = events
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::Result { outcome: Ok(v), .. } => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(before.len(), 10);
    assert!(before.iter().all(|v| *v < 10));
    let stats = coordinator.stats();
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.dropped, 190);

    coordinator.submit(7).unwrap();
    let (after, _) = collect_results(&events, 1);
    assert_eq!(after, vec![(7, Ok(1007))]);
    coordinator.stop();
}

#[test]
fn test_set_function_while_idle_stays_idle() {
    let coordinator = TaskCoordinator::with_function(config(2), identity()).unwrap();
    coordinator.submit_many(0..3).unwrap();
    coordinator
        .set_function(TaskFunction::new("double", |x: &u64| Ok(x * 2)))
        .unwrap();
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.pending(), 0);
    assert_eq!(coordinator.stats().dropped, 3);
}

#[test_log::test]
fn test_failing_task_is_error_tagged() {
    let coordinator = TaskCoordinator::with_function(
        config(4),
        TaskFunction::new("fail-13", |x: &u64| {
            if *x == 13 {
                Err(TaskError::failed("unlucky"))
            } else {
                Ok(*x)
            }
        }),
    )
    .unwrap();
    let events = coordinator.events();

    coordinator.submit_many(0..20).unwrap();
    coordinator.start().unwrap();

    let (results, _) = collect_results(&events, 20);
    let errors: Vec<&(u64, TaskOutcome<u64>)> =
        results.iter().filter(|(_, outcome)| outcome.is_err()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, 13);
    assert_eq!(coordinator.stats().failed, 1);
    coordinator.stop();
}

#[test]
fn test_panicking_task_keeps_worker_alive() {
    let coordinator = TaskCoordinator::with_function(
        config(1),
        TaskFunction::new("panic-on-2", |x: &u64| {
            if *x == 2 {
                panic!("boom");
            }
            Ok(*x)
        }),
    )
    .unwrap();
    let events = coordinator.events();

    coordinator.submit_many(0..5).unwrap();
    coordinator.start().unwrap();

    let (results, _) = collect_results(&events, 5);
    let (task, outcome) = &results[2];
    assert_eq!(*task, 2);
    let error = outcome.as_ref().unwrap_err();
    assert_eq!(error.kind, TaskErrorKind::Panicked);
    assert!(error.message.contains("boom"));
    assert_eq!(results[4], (4, Ok(4)));
    coordinator.stop();
}

#[test]
fn test_dispatch_gate_holds_front_task() {
    let coordinator = TaskCoordinator::with_function(config(2), identity()).unwrap();
    let events = coordinator.events();
    let open = Arc::new(AtomicBool::new(false));
    let gate_open = Arc::clone(&open);
    coordinator.set_dispatch_gate(move |task: &u64| *task < 5 || gate_open.load(Ordering::SeqCst));

    coordinator.submit_many(0..10).unwrap();
    coordinator.start().unwrap();

    let (first, _) = collect_results(&events, 5);
    let first: HashSet<u64> = first.into_iter().map(|(task, _)| task).collect();
    assert_eq!(first, (0..5).collect::<HashSet<_>>());

    thread::sleep(Duration::from_millis(20));
    assert_eq!(coordinator.pending(), 5);
    assert_eq!(coordinator.stats().dispatched, 5);

    open.store(true, Ordering::SeqCst);
    let (rest, _) = collect_results(&events, 5);
    assert_eq!(rest.len(), 5);
    assert_eq!(coordinator.pending(), 0);
    coordinator.stop();
}

#[test]
fn test_concurrent_submitters() {
    let coordinator = Arc::new(TaskCoordinator::with_function(config(4), identity()).unwrap());
    let events = coordinator.events();
    coordinator.start().unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let submitters: Vec<_> = (0..4u64)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for task in (i * 250)..((i + 1) * 250) {
                    coordinator.submit(task).unwrap();
                }
            })
        })
        .collect();
    for handle in submitters {
        handle.join().unwrap();
    }

    let (results, _) = collect_results(&events, 1000);
    let tasks: HashSet<u64> = results.into_iter().map(|(task, _)| task).collect();
    assert_eq!(tasks.len(), 1000);
    coordinator.stop();
}

#[test]
fn test_reset_backlog_refused_while_running() {
    let coordinator = TaskCoordinator::with_function(config(1), identity()).unwrap();
    coordinator.start().unwrap();
    assert!(matches!(coordinator.reset_backlog(), Err(EngineError::InProgress)));
    assert!(matches!(coordinator.set_worker_count(2), Err(EngineError::InProgress)));
    coordinator.stop();
}

#[test_log::test]
fn test_panicking_gate_holds_task_and_stop_still_finishes() {
    let coordinator = TaskCoordinator::with_function(config(2), identity()).unwrap();
    let events = coordinator.events();
    coordinator.set_dispatch_gate(|task: &u64| {
        if *task == 3 {
            panic!("gate cannot judge task 3");
        }
        true
    });

    coordinator.submit_many(0..6).unwrap();
    coordinator.start().unwrap();

    let (results, _) = collect_results(&events, 3);
    let tasks: HashSet<u64> = results.into_iter().map(|(task, _)| task).collect();
    assert_eq!(tasks, (0..3).collect::<HashSet<_>>());
    thread::sleep(Duration::from_millis(20));
    assert_eq!(coordinator.pending(), 3);

    assert_eq!(stop_and_count_finished(&coordinator), 1);
    assert!(!coordinator.is_active());
}

#[test_log::test]
fn test_set_function_times_out_while_task_is_held() {
    let release = Arc::new(AtomicBool::new(false));
    let held = {
        let release = Arc::clone(&release);
        TaskFunction::new("held-identity", move |x: &u64| {
            while !release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(*x)
        })
    };
    let coordinator = TaskCoordinator::with_function(
        config(1).with_drain_timeout(Duration::from_millis(50)),
        held,
    )
    .unwrap();
    let events = coordinator.events();
    coordinator.set_dispatch_gate(|task: &u64| *task == 0);

    coordinator.submit_many(0..3).unwrap();
    coordinator.start().unwrap();
    wait_until(|| coordinator.stats().dispatched == 1);

    assert!(!coordinator.wait_until_idle(Duration::from_millis(20)));
    let replaced = coordinator.set_function(TaskFunction::new("plus-1000", |x: &u64| Ok(x + 1000)));
    assert!(matches!(replaced, Err(EngineError::DrainTimeout(_))));
    assert!(coordinator.is_running());
    assert_eq!(coordinator.pending(), 2);

    release.store(true, Ordering::SeqCst);
    coordinator.clear_dispatch_gate();
    let (mut results, _) = collect_results(&events, 3);
    results.sort_by_key(|(task, _)| *task);
    assert_eq!(results, vec![(0, Ok(0)), (1, Ok(1)), (2, Ok(2))]);
    assert_eq!(coordinator.stats().dropped, 0);
    coordinator.stop();
}
