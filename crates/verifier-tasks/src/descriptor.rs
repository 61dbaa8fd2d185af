use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::TaskType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `Waiting -> Running -> {Success | Error | Cancelled}`; a waiting task may
/// also go straight to `Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Waiting,
    Running,
    Success,
    Error,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error | TaskState::Cancelled)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TaskProgress {
    /// In `[0.0, 1.0]`.
    pub fraction: f64,
    pub text: String,
}

pub(crate) struct Lifecycle {
    pub(crate) state: TaskState,
    pub(crate) progress: TaskProgress,
    pub(crate) started_at: Option<SystemTime>,
    pub(crate) ended_at: Option<SystemTime>,
    pub(crate) error: Option<String>,
}

struct Inner {
    id: TaskId,
    name: String,
    task_type: TaskType,
    priority: i32,
    created_at: SystemTime,
    token: CancellationToken,
    /// Stops the deadline timer; a child of `token`, so cancellation stops it too.
    timer: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
    completed: Mutex<bool>,
    completed_cv: Condvar,
}

/// Shared view of one enqueued task. Cheap to clone; equality is by id.
#[derive(Clone)]
pub struct TaskDescriptor {
    inner: Arc<Inner>,
}

impl TaskDescriptor {
    pub(crate) fn new(id: TaskId, name: String, task_type: TaskType, priority: i32) -> Self {
        let token = CancellationToken::new();
        let timer = token.child_token();
        Self {
            inner: Arc::new(Inner {
                id,
                name,
                task_type,
                priority,
                created_at: SystemTime::now(),
                token,
                timer,
                lifecycle: Mutex::new(Lifecycle {
                    state: TaskState::Waiting,
                    progress: TaskProgress::default(),
                    started_at: None,
                    ended_at: None,
                    error: None,
                }),
                completed: Mutex::new(false),
                completed_cv: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn presentable_name(&self) -> &str {
        &self.inner.name
    }

    pub fn task_type(&self) -> &TaskType {
        &self.inner.task_type
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    pub fn created_at(&self) -> SystemTime {
        self.inner.created_at
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.inner.lifecycle.lock().started_at
    }

    pub fn ended_at(&self) -> Option<SystemTime> {
        self.inner.lifecycle.lock().ended_at
    }

    pub fn state(&self) -> TaskState {
        self.inner.lifecycle.lock().state
    }

    pub fn progress(&self) -> TaskProgress {
        self.inner.lifecycle.lock().progress.clone()
    }

    /// Message of the error the task failed with, if it failed.
    pub fn error_message(&self) -> Option<String> {
        self.inner.lifecycle.lock().error.clone()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub(crate) fn timer_token(&self) -> &CancellationToken {
        &self.inner.timer
    }

    /// Blocks until the task's callbacks have all run. Returns `false` on timeout.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut completed = self.inner.completed.lock();
        while !*completed {
            if self.inner.completed_cv.wait_until(&mut completed, deadline).timed_out() {
                return *completed;
            }
        }
        true
    }

    pub fn is_completed(&self) -> bool {
        *self.inner.completed.lock()
    }

    pub(crate) fn lifecycle(&self) -> parking_lot::MutexGuard<'_, Lifecycle> {
        self.inner.lifecycle.lock()
    }

    pub(crate) fn set_progress(&self, fraction: Option<f64>, text: Option<String>) -> TaskProgress {
        let mut lifecycle = self.inner.lifecycle.lock();
        if let Some(fraction) = fraction {
            lifecycle.progress.fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        }
        if let Some(text) = text {
            lifecycle.progress.text = text;
        }
        lifecycle.progress.clone()
    }

    #[cfg(test)]
    pub(crate) fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn mark_completed(&self) {
        *self.inner.completed.lock() = true;
        self.inner.completed_cv.notify_all();
    }
}

impl PartialEq for TaskDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for TaskDescriptor {}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("type", &self.inner.task_type)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {} [{}]", self.inner.id, self.inner.name, self.inner.task_type)
    }
}
