use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use tokio::runtime::Runtime;

use crate::pool::{build_rayon_pool, build_timer_runtime, TypePool};
use crate::progress::ProgressSender;
use crate::{
    panic_message, Task, TaskContext, TaskDescriptor, TaskError, TaskId, TaskManagerError, TaskProgressReceiver,
    TaskState, TaskType,
};

#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Worker threads per task type.
    pub concurrency: usize,
    /// Per task type name, replaces `concurrency`.
    pub concurrency_overrides: HashMap<String, usize>,
    /// Number of finished descriptors kept for [`TaskManager::last_finished_tasks`].
    pub history_limit: usize,
    pub progress_channel_capacity: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            concurrency_overrides: HashMap::new(),
            history_limit: 128,
            progress_channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Cancels the task once reached, whether it is still queued or running.
    pub deadline: Option<Instant>,
    /// Replaces [`Task::priority`].
    pub priority: Option<i32>,
}

impl EnqueueOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            priority: None,
        }
    }
}

type OnSuccess<T> = Box<dyn FnOnce(T, &TaskDescriptor) + Send>;
type OnError = Box<dyn FnOnce(TaskError, &TaskDescriptor) + Send>;
type OnCompletion = Box<dyn FnOnce(&TaskDescriptor) + Send>;

/// Lifecycle callbacks of one task.
///
/// Exactly one of `on_success`/`on_error` runs unless the task is cancelled,
/// then `on_completion` always runs last. A panicking callback is logged and
/// does not affect the others.
pub struct TaskCallbacks<T> {
    on_success: Option<OnSuccess<T>>,
    on_error: Option<OnError>,
    on_completion: Option<OnCompletion>,
}

impl<T> Default for TaskCallbacks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_completion: None,
        }
    }
}

impl<T> TaskCallbacks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce(T, &TaskDescriptor) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(TaskError, &TaskDescriptor) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_completion(mut self, f: impl FnOnce(&TaskDescriptor) + Send + 'static) -> Self {
        self.on_completion = Some(Box::new(f));
        self
    }
}

enum Outcome<T> {
    Success(T),
    Error(TaskError),
    Cancelled,
}

impl<T> Outcome<T> {
    fn state(&self) -> TaskState {
        match self {
            Outcome::Success(_) => TaskState::Success,
            Outcome::Error(_) => TaskState::Error,
            Outcome::Cancelled => TaskState::Cancelled,
        }
    }
}

struct ManagerState {
    closed: bool,
    active: BTreeMap<TaskId, TaskDescriptor>,
    finished: VecDeque<TaskDescriptor>,
    pools: HashMap<TaskType, Arc<TypePool>>,
}

struct Inner {
    config: TaskManagerConfig,
    state: Mutex<ManagerState>,
    /// Signalled whenever `active` becomes empty.
    idle: Condvar,
    next_id: AtomicU64,
    progress: ProgressSender,
    timers: Option<Runtime>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(runtime) = self.timers.take() {
            runtime.shutdown_background();
        }
    }
}

/// Runs tasks on isolated per-type worker pools in priority order.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Self {
        let progress = ProgressSender::new(config.progress_channel_capacity);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ManagerState {
                    closed: false,
                    active: BTreeMap::new(),
                    finished: VecDeque::with_capacity(config.history_limit.min(1024)),
                    pools: HashMap::new(),
                }),
                config,
                idle: Condvar::new(),
                next_id: AtomicU64::new(1),
                progress,
                timers: build_timer_runtime(),
            }),
        }
    }

    pub fn subscribe_progress(&self) -> TaskProgressReceiver {
        self.inner.progress.subscribe()
    }

    /// Schedules `task` and returns immediately.
    pub fn enqueue<T: Task>(
        &self,
        task: T,
        on_success: impl FnOnce(T::Output, &TaskDescriptor) + Send + 'static,
        on_error: impl FnOnce(TaskError, &TaskDescriptor) + Send + 'static,
        on_completion: impl FnOnce(&TaskDescriptor) + Send + 'static,
    ) -> Result<TaskDescriptor, TaskManagerError> {
        let callbacks = TaskCallbacks::new()
            .on_success(on_success)
            .on_error(on_error)
            .on_completion(on_completion);
        self.enqueue_with_options(task, EnqueueOptions::default(), callbacks)
    }

    pub fn enqueue_with_options<T: Task>(
        &self,
        task: T,
        options: EnqueueOptions,
        callbacks: TaskCallbacks<T::Output>,
    ) -> Result<TaskDescriptor, TaskManagerError> {
        let task_type = task.task_type();
        let priority = options.priority.unwrap_or_else(|| task.priority());
        let seq = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let descriptor = TaskDescriptor::new(TaskId(seq), task.presentable_name(), task_type.clone(), priority);

        let pool = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(TaskManagerError::Closed);
            }
            state.active.insert(descriptor.id(), descriptor.clone());
            self.pool_for(&mut state, &task_type)
        };

        tracing::debug!(
            target = "verifier.tasks",
            task_id = seq,
            task = %descriptor.presentable_name(),
            task_type = %task_type,
            priority,
            "task scheduled"
        );

        if let Some(deadline) = options.deadline {
            self.arm_deadline(&descriptor, deadline);
        }

        let job_inner = Arc::clone(&self.inner);
        let job_descriptor = descriptor.clone();
        pool.push(
            descriptor.id(),
            priority,
            seq,
            Box::new(move || run_task(&job_inner, task, job_descriptor, callbacks)),
        );
        let worker_pool = Arc::clone(&pool);
        pool.workers.spawn(move || {
            if let Some(job) = worker_pool.pop() {
                (job.run)();
            }
        });

        Ok(descriptor)
    }

    fn pool_for(&self, state: &mut ManagerState, task_type: &TaskType) -> Arc<TypePool> {
        let config = &self.inner.config;
        Arc::clone(state.pools.entry(task_type.clone()).or_insert_with(|| {
            let threads = config
                .concurrency_overrides
                .get(task_type.name())
                .copied()
                .unwrap_or(config.concurrency);
            tracing::debug!(target = "verifier.tasks", task_type = %task_type, threads, "starting worker pool");
            Arc::new(TypePool::new(build_rayon_pool(format!("verifier-{task_type}"), threads)))
        }))
    }

    fn arm_deadline(&self, descriptor: &TaskDescriptor, deadline: Instant) {
        let Some(runtime) = &self.inner.timers else {
            return;
        };
        let manager = Arc::downgrade(&self.inner);
        let descriptor = descriptor.clone();
        runtime.spawn(async move {
            let token = descriptor.timer_token().clone();
            tokio::select! {
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    expire(&manager, &descriptor);
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Cancels a task. A queued task is removed and never runs; a running task
    /// is signalled and ends `Cancelled` once it returns. No-op for finished tasks.
    pub fn cancel(&self, descriptor: &TaskDescriptor) {
        cancel_task(&self.inner, descriptor);
    }

    /// Unfinished tasks grouped by type, each group in dispatch order.
    pub fn active_tasks(&self) -> BTreeMap<TaskType, Vec<TaskDescriptor>> {
        let state = self.inner.state.lock();
        let mut grouped: BTreeMap<TaskType, Vec<TaskDescriptor>> = BTreeMap::new();
        for descriptor in state.active.values() {
            grouped
                .entry(descriptor.task_type().clone())
                .or_default()
                .push(descriptor.clone());
        }
        for tasks in grouped.values_mut() {
            tasks.sort_by_key(|d| (std::cmp::Reverse(d.priority()), d.id()));
        }
        grouped
    }

    /// Most recently finished tasks, oldest first.
    pub fn last_finished_tasks(&self) -> Vec<TaskDescriptor> {
        self.inner.state.lock().finished.iter().cloned().collect()
    }

    /// Stops accepting tasks and waits up to `timeout` for queued and running
    /// ones to finish. Whatever is left is then cancelled and given another
    /// `timeout` to wind down.
    pub fn close(&self, timeout: Duration) -> Result<(), TaskManagerError> {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(TaskManagerError::AlreadyClosed);
            }
            state.closed = true;
        }
        tracing::info!(target = "verifier.tasks", "closing task manager");

        if self.wait_idle(timeout) {
            return Ok(());
        }

        let leftovers: Vec<TaskDescriptor> = self.inner.state.lock().active.values().cloned().collect();
        tracing::warn!(
            target = "verifier.tasks",
            remaining = leftovers.len(),
            "tasks did not finish before shutdown timeout; cancelling"
        );
        for descriptor in &leftovers {
            self.cancel(descriptor);
        }
        if !self.wait_idle(timeout) {
            tracing::warn!(target = "verifier.tasks", "tasks still running after cancellation");
        }
        Ok(())
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.active.is_empty() {
            if self.inner.idle.wait_until(&mut state, deadline).timed_out() {
                return state.active.is_empty();
            }
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

fn expire(manager: &Weak<Inner>, descriptor: &TaskDescriptor) {
    if descriptor.state().is_terminal() {
        return;
    }
    let Some(inner) = manager.upgrade() else {
        return;
    };
    tracing::info!(target = "verifier.tasks", task_id = descriptor.id().0, "task deadline exceeded");
    descriptor.set_progress(None, Some("deadline exceeded".to_string()));
    cancel_task(&inner, descriptor);
}

fn cancel_task(inner: &Inner, descriptor: &TaskDescriptor) {
    let queued = {
        let mut state = inner.state.lock();
        let mut lifecycle = descriptor.lifecycle();
        let current = lifecycle.state;
        match current {
            TaskState::Waiting => {
                lifecycle.state = TaskState::Cancelled;
                lifecycle.ended_at = Some(SystemTime::now());
                drop(lifecycle);
                descriptor.token().cancel();
                retire(inner, &mut state, descriptor);
                state.pools.get(descriptor.task_type()).and_then(|pool| pool.take(descriptor.id()))
            }
            TaskState::Running => {
                descriptor.token().cancel();
                None
            }
            _ => None,
        }
    };
    tracing::debug!(target = "verifier.tasks", task_id = descriptor.id().0, "task cancelled");

    // Taken off the queue: the job only runs its completion path. Otherwise a
    // worker already holds it and does the same on seeing `Cancelled`.
    if let Some(job) = queued {
        (job.run)();
    }
}

/// Moves a terminal descriptor from the active set into the bounded history.
fn retire(inner: &Inner, state: &mut ManagerState, descriptor: &TaskDescriptor) {
    state.active.remove(&descriptor.id());
    state.finished.push_back(descriptor.clone());
    while state.finished.len() > inner.config.history_limit {
        state.finished.pop_front();
    }
    if state.active.is_empty() {
        inner.idle.notify_all();
    }
}

fn run_task<T: Task>(inner: &Inner, task: T, descriptor: TaskDescriptor, callbacks: TaskCallbacks<T::Output>) {
    let started = {
        let _state = inner.state.lock();
        let mut lifecycle = descriptor.lifecycle();
        if lifecycle.state == TaskState::Waiting {
            lifecycle.state = TaskState::Running;
            lifecycle.started_at = Some(SystemTime::now());
            true
        } else {
            false
        }
    };

    if !started {
        finish_callbacks(inner, &descriptor, Outcome::Cancelled, callbacks);
        return;
    }

    inner.progress.started(descriptor.id(), descriptor.presentable_name());
    tracing::debug!(target = "verifier.tasks", task_id = descriptor.id().0, "task started");

    let ctx = TaskContext::new(descriptor.clone(), inner.progress.clone());
    let result = catch_unwind(AssertUnwindSafe(|| task.execute(&ctx)));
    let outcome = match result {
        _ if descriptor.token().is_cancelled() => Outcome::Cancelled,
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(TaskError::Cancelled)) => Outcome::Cancelled,
        Ok(Err(err)) => Outcome::Error(err),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(
                target = "verifier.tasks",
                task_id = descriptor.id().0,
                panic = %message,
                "task panicked"
            );
            Outcome::Error(TaskError::Panicked(message))
        }
    };

    {
        let mut state = inner.state.lock();
        let mut lifecycle = descriptor.lifecycle();
        lifecycle.state = outcome.state();
        lifecycle.ended_at = Some(SystemTime::now());
        match &outcome {
            Outcome::Success(_) => lifecycle.progress.fraction = 1.0,
            Outcome::Error(err) => lifecycle.error = Some(err.to_string()),
            Outcome::Cancelled => {}
        }
        drop(lifecycle);
        retire(inner, &mut state, &descriptor);
    }

    tracing::info!(
        target = "verifier.tasks",
        task_id = descriptor.id().0,
        task = %descriptor.presentable_name(),
        state = ?outcome.state(),
        "task finished"
    );
    finish_callbacks(inner, &descriptor, outcome, callbacks);
}

fn finish_callbacks<T>(inner: &Inner, descriptor: &TaskDescriptor, outcome: Outcome<T>, callbacks: TaskCallbacks<T>) {
    descriptor.timer_token().cancel();
    let state = outcome.state();
    match outcome {
        Outcome::Success(value) => {
            if let Some(on_success) = callbacks.on_success {
                isolate(descriptor, "on_success", || on_success(value, descriptor));
            }
        }
        Outcome::Error(err) => {
            if let Some(on_error) = callbacks.on_error {
                isolate(descriptor, "on_error", || on_error(err, descriptor));
            }
        }
        Outcome::Cancelled => {}
    }
    if let Some(on_completion) = callbacks.on_completion {
        isolate(descriptor, "on_completion", || on_completion(descriptor));
    }
    inner.progress.finished(descriptor.id(), state);
    descriptor.mark_completed();
}

fn isolate(descriptor: &TaskDescriptor, callback: &'static str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(
            target = "verifier.tasks",
            task_id = descriptor.id().0,
            callback,
            panic = %panic_message(panic.as_ref()),
            "task callback panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_fn;

    const QUICK: TaskType = TaskType::new("quick");

    fn manager(concurrency: usize) -> TaskManager {
        TaskManager::new(TaskManagerConfig {
            concurrency,
            ..TaskManagerConfig::default()
        })
    }

    #[test]
    fn success_reports_value_then_completion() {
        let manager = manager(2);
        let events = Arc::new(Mutex::new(Vec::new()));
        let (ok, err, done) = (Arc::clone(&events), Arc::clone(&events), Arc::clone(&events));

        let descriptor = manager
            .enqueue(
                task_fn(QUICK, "answer", |_| Ok(42)),
                move |value, _| ok.lock().push(format!("success:{value}")),
                move |e, _| err.lock().push(format!("error:{e}")),
                move |_| done.lock().push("completion".to_string()),
            )
            .unwrap();

        assert!(descriptor.wait_for_completion(Duration::from_secs(10)));
        assert_eq!(*events.lock(), vec!["success:42", "completion"]);
        assert_eq!(descriptor.state(), TaskState::Success);
        assert!(descriptor.ended_at().is_some());
        assert_eq!(descriptor.progress().fraction, 1.0);
    }

    #[test]
    fn failed_task_keeps_its_last_progress() {
        let manager = manager(1);
        let descriptor = manager
            .enqueue_with_options(
                task_fn(QUICK, "half", |ctx| -> Result<(), TaskError> {
                    ctx.report(0.5, "halfway");
                    Err(TaskError::failed("gave up"))
                }),
                EnqueueOptions::default(),
                TaskCallbacks::new(),
            )
            .unwrap();

        assert!(descriptor.wait_for_completion(Duration::from_secs(10)));
        assert_eq!(descriptor.state(), TaskState::Error);
        assert_eq!(descriptor.progress().fraction, 0.5);
    }

    #[test]
    fn finished_task_releases_its_deadline_timer() {
        let manager = manager(1);
        let descriptor = manager
            .enqueue_with_options(
                task_fn(QUICK, "quick", |_| Ok(())),
                EnqueueOptions::with_timeout(Duration::from_secs(3600)),
                TaskCallbacks::new(),
            )
            .unwrap();
        assert!(descriptor.wait_for_completion(Duration::from_secs(10)));
        assert!(descriptor.timer_token().is_cancelled());
        assert!(!descriptor.token().is_cancelled());

        // Left: this handle and the history entry.
        let give_up = Instant::now() + Duration::from_secs(10);
        while descriptor.handle_count() > 2 && Instant::now() < give_up {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(descriptor.handle_count(), 2);
        assert_eq!(descriptor.state(), TaskState::Success);
    }

    #[test]
    fn panicking_task_is_an_error() {
        let manager = manager(1);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let descriptor = manager
            .enqueue_with_options(
                task_fn(QUICK, "boom", |_| -> Result<(), TaskError> { panic!("kaboom") }),
                EnqueueOptions::default(),
                TaskCallbacks::new().on_error(move |err, _| *sink.lock() = Some(err.to_string())),
            )
            .unwrap();

        assert!(descriptor.wait_for_completion(Duration::from_secs(10)));
        assert_eq!(descriptor.state(), TaskState::Error);
        assert_eq!(seen.lock().as_deref(), Some("task panicked: kaboom"));
        assert_eq!(descriptor.error_message().as_deref(), Some("task panicked: kaboom"));
    }

    #[test]
    fn callback_panic_does_not_skip_completion() {
        let manager = manager(1);
        let completed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&completed);
        let descriptor = manager
            .enqueue(
                task_fn(QUICK, "ok", |_| Ok(())),
                |_, _| panic!("callback failure"),
                |_, _| {},
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        assert!(descriptor.wait_for_completion(Duration::from_secs(10)));
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(descriptor.state(), TaskState::Success);
    }

    #[test]
    fn enqueue_after_close_is_rejected() {
        let manager = manager(1);
        manager.close(Duration::from_secs(1)).unwrap();
        let result = manager.enqueue(task_fn(QUICK, "late", |_| Ok(())), |_, _| {}, |_, _| {}, |_| {});
        assert_eq!(result.unwrap_err(), TaskManagerError::Closed);
        assert_eq!(manager.close(Duration::from_secs(1)), Err(TaskManagerError::AlreadyClosed));
    }
}
