use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::time::Duration;

use parking_lot::Mutex;
use verifier_tasks::{
    task_fn, EnqueueOptions, TaskCallbacks, TaskError, TaskManager, TaskManagerConfig, TaskProgressEvent, TaskState,
    TaskType,
};

const WAIT: Duration = Duration::from_secs(10);
const SERIAL: TaskType = TaskType::new("serial");

fn single_threaded() -> TaskManager {
    TaskManager::new(TaskManagerConfig {
        concurrency: 1,
        ..TaskManagerConfig::default()
    })
}

#[derive(Default)]
struct Calls {
    success: AtomicUsize,
    error: AtomicUsize,
    completion: AtomicUsize,
}

impl Calls {
    fn callbacks<T: Send + 'static>(self: &Arc<Self>) -> TaskCallbacks<T> {
        let (s, e, c) = (Arc::clone(self), Arc::clone(self), Arc::clone(self));
        TaskCallbacks::new()
            .on_success(move |_, _| {
                s.success.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_, _| {
                e.error.fetch_add(1, Ordering::SeqCst);
            })
            .on_completion(move |_| {
                c.completion.fetch_add(1, Ordering::SeqCst);
            })
    }

    fn counts(&self) -> (usize, usize, usize) {
        (
            self.success.load(Ordering::SeqCst),
            self.error.load(Ordering::SeqCst),
            self.completion.load(Ordering::SeqCst),
        )
    }
}

/// Occupies the single worker of `SERIAL` until the returned sender fires.
fn block_serial_pool(manager: &TaskManager) -> (mpsc::Sender<()>, verifier_tasks::TaskDescriptor) {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started = Arc::new(Barrier::new(2));
    let started_in_task = Arc::clone(&started);
    let blocker = manager
        .enqueue(
            task_fn(SERIAL, "blocker", move |_| {
                started_in_task.wait();
                let _ = release_rx.recv_timeout(WAIT);
                Ok(())
            }),
            |_, _| {},
            |_, _| {},
            |_| {},
        )
        .unwrap();
    started.wait();
    (release_tx, blocker)
}

#[test]
fn failing_task_reports_error_only() {
    let manager = single_threaded();
    let calls = Arc::new(Calls::default());
    let descriptor = manager
        .enqueue_with_options(
            task_fn(SERIAL, "fails", |_| -> Result<(), TaskError> {
                Err(TaskError::failed("no such plugin"))
            }),
            EnqueueOptions::default(),
            calls.callbacks(),
        )
        .unwrap();

    assert!(descriptor.wait_for_completion(WAIT));
    assert_eq!(calls.counts(), (0, 1, 1));
    assert_eq!(descriptor.state(), TaskState::Error);
    assert_eq!(descriptor.error_message().as_deref(), Some("no such plugin"));
}

#[test]
fn cancelled_before_start_never_runs() {
    let manager = single_threaded();
    let (release, blocker) = block_serial_pool(&manager);

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_in_task = Arc::clone(&ran);
    let calls = Arc::new(Calls::default());
    let queued = manager
        .enqueue_with_options(
            task_fn(SERIAL, "queued", move |_| {
                ran_in_task.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            EnqueueOptions::default(),
            calls.callbacks(),
        )
        .unwrap();
    assert_eq!(queued.state(), TaskState::Waiting);

    manager.cancel(&queued);
    assert!(queued.wait_for_completion(WAIT));
    assert_eq!(queued.state(), TaskState::Cancelled);
    assert!(queued.started_at().is_none());
    assert_eq!(calls.counts(), (0, 0, 1));

    release.send(()).unwrap();
    assert!(blocker.wait_for_completion(WAIT));
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    // Cancelling a finished task changes nothing.
    manager.cancel(&blocker);
    assert_eq!(blocker.state(), TaskState::Success);
}

#[test]
fn cancelling_running_task_skips_success_and_error() {
    let manager = single_threaded();
    let started = Arc::new(Barrier::new(2));
    let started_in_task = Arc::clone(&started);
    let calls = Arc::new(Calls::default());
    let descriptor = manager
        .enqueue_with_options(
            task_fn(SERIAL, "spins", move |ctx| {
                started_in_task.wait();
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                // Returning a value after cancellation still counts as cancelled.
                Ok(7)
            }),
            EnqueueOptions::default(),
            calls.callbacks(),
        )
        .unwrap();

    started.wait();
    assert_eq!(descriptor.state(), TaskState::Running);
    manager.cancel(&descriptor);

    assert!(descriptor.wait_for_completion(WAIT));
    assert_eq!(descriptor.state(), TaskState::Cancelled);
    assert_eq!(calls.counts(), (0, 0, 1));
}

#[test]
fn queued_tasks_run_by_priority_then_fifo() {
    let manager = single_threaded();
    let (release, _blocker) = block_serial_pool(&manager);

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut descriptors = Vec::new();
    for (name, priority) in [("low-1", 0), ("high-1", 10), ("low-2", 0), ("high-2", 10), ("mid", 5)] {
        let order = Arc::clone(&order);
        let task = task_fn(SERIAL, name, move |_| {
            order.lock().push(name);
            Ok(())
        })
        .with_priority(priority);
        descriptors.push(manager.enqueue(task, |_, _| {}, |_, _| {}, |_| {}).unwrap());
    }

    let active = manager.active_tasks();
    let queued: Vec<_> = active[&SERIAL].iter().map(|d| d.presentable_name().to_string()).collect();
    assert_eq!(queued, vec!["high-1", "high-2", "mid", "blocker", "low-1", "low-2"]);

    release.send(()).unwrap();
    for descriptor in &descriptors {
        assert!(descriptor.wait_for_completion(WAIT));
    }
    assert_eq!(*order.lock(), vec!["high-1", "high-2", "mid", "low-1", "low-2"]);
}

#[test]
fn task_types_have_separate_pools() {
    let manager = single_threaded();
    let (release, blocker) = block_serial_pool(&manager);

    let other = manager
        .enqueue(task_fn(TaskType::new("other"), "independent", |_| Ok(1)), |_, _| {}, |_, _| {}, |_| {})
        .unwrap();
    assert!(other.wait_for_completion(WAIT));
    assert_eq!(blocker.state(), TaskState::Running);

    release.send(()).unwrap();
    assert!(blocker.wait_for_completion(WAIT));
}

#[test]
fn history_keeps_most_recent_tasks() {
    let manager = TaskManager::new(TaskManagerConfig {
        concurrency: 1,
        history_limit: 128,
        ..TaskManagerConfig::default()
    });

    let mut last = None;
    for i in 0..200 {
        let descriptor = manager
            .enqueue(task_fn(SERIAL, format!("task-{i}"), |_| Ok(())), |_, _| {}, |_, _| {}, |_| {})
            .unwrap();
        last = Some(descriptor);
    }
    assert!(last.unwrap().wait_for_completion(WAIT));

    let finished = manager.last_finished_tasks();
    assert_eq!(finished.len(), 128);
    assert_eq!(finished.first().unwrap().presentable_name(), "task-72");
    assert_eq!(finished.last().unwrap().presentable_name(), "task-199");
    assert!(manager.active_tasks().is_empty());
}

#[test]
fn deadline_cancels_running_task() {
    let manager = single_threaded();
    let calls = Arc::new(Calls::default());
    let descriptor = manager
        .enqueue_with_options(
            task_fn(SERIAL, "slow", |ctx| {
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                ctx.check_cancelled()
            }),
            EnqueueOptions::with_timeout(Duration::from_millis(50)),
            calls.callbacks(),
        )
        .unwrap();

    assert!(descriptor.wait_for_completion(WAIT));
    assert_eq!(descriptor.state(), TaskState::Cancelled);
    assert_eq!(descriptor.progress().text, "deadline exceeded");
    assert_eq!(calls.counts(), (0, 0, 1));
}

#[test]
fn progress_events_follow_the_lifecycle() {
    let manager = single_threaded();
    let mut events = manager.subscribe_progress();
    let descriptor = manager
        .enqueue(
            task_fn(SERIAL, "reports", |ctx| {
                ctx.report(0.5, "halfway");
                Ok(())
            }),
            |_, _| {},
            |_, _| {},
            |_| {},
        )
        .unwrap();
    assert!(descriptor.wait_for_completion(WAIT));

    let id = descriptor.id();
    assert_eq!(
        events.try_recv().unwrap(),
        TaskProgressEvent::Started {
            id,
            name: "reports".to_string()
        }
    );
    match events.try_recv().unwrap() {
        TaskProgressEvent::Progress { id: got, progress } => {
            assert_eq!(got, id);
            assert_eq!(progress.fraction, 0.5);
            assert_eq!(progress.text, "halfway");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        events.try_recv().unwrap(),
        TaskProgressEvent::Finished {
            id,
            state: TaskState::Success
        }
    );
}

#[test]
fn close_waits_for_running_tasks() {
    let manager = single_threaded();
    let descriptor = manager
        .enqueue(
            task_fn(SERIAL, "short", |_| {
                std::thread::sleep(Duration::from_millis(30));
                Ok(())
            }),
            |_, _| {},
            |_, _| {},
            |_| {},
        )
        .unwrap();

    manager.close(WAIT).unwrap();
    assert!(manager.is_closed());
    assert!(manager.active_tasks().is_empty());
    assert_eq!(descriptor.state(), TaskState::Success);
}

#[test]
fn close_cancels_tasks_that_outlive_the_timeout() {
    let manager = single_threaded();
    let descriptor = manager
        .enqueue(
            task_fn(SERIAL, "stubborn", |ctx| {
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Ok(())
            }),
            |_, _| {},
            |_, _| {},
            |_| {},
        )
        .unwrap();

    manager.close(Duration::from_millis(50)).unwrap();
    assert!(descriptor.wait_for_completion(WAIT));
    assert_eq!(descriptor.state(), TaskState::Cancelled);
}
