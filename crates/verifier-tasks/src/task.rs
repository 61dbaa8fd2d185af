use std::borrow::Cow;
use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::progress::ProgressSender;
use crate::{TaskDescriptor, TaskError};

/// Routing key selecting the worker pool a task runs on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskType(Cow<'static, str>);

impl TaskType {
    pub const fn new(name: &'static str) -> Self {
        TaskType(Cow::Borrowed(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskType {
    fn from(name: String) -> Self {
        TaskType(Cow::Owned(name))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of work run by the [`TaskManager`](crate::TaskManager).
pub trait Task: Send + 'static {
    type Output: Send + 'static;

    fn task_type(&self) -> TaskType;

    fn presentable_name(&self) -> String;

    /// Higher runs first among queued tasks of the same type.
    fn priority(&self) -> i32 {
        0
    }

    /// Runs the task. Long-running work should call
    /// [`TaskContext::check_cancelled`] between steps.
    fn execute(self, ctx: &TaskContext) -> Result<Self::Output, TaskError>;
}

/// Handed to a running task: cancellation signal and progress sink.
pub struct TaskContext {
    descriptor: TaskDescriptor,
    progress: ProgressSender,
}

impl TaskContext {
    pub(crate) fn new(descriptor: TaskDescriptor, progress: ProgressSender) -> Self {
        Self { descriptor, progress }
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn token(&self) -> &CancellationToken {
        self.descriptor.token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Records progress; `fraction` is clamped into `[0.0, 1.0]`.
    pub fn report(&self, fraction: f64, text: impl Into<String>) {
        let progress = self.descriptor.set_progress(Some(fraction), Some(text.into()));
        self.progress.progress(self.descriptor.id(), progress);
    }

    pub fn set_fraction(&self, fraction: f64) {
        let progress = self.descriptor.set_progress(Some(fraction), None);
        self.progress.progress(self.descriptor.id(), progress);
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let progress = self.descriptor.set_progress(None, Some(text.into()));
        self.progress.progress(self.descriptor.id(), progress);
    }
}

/// A [`Task`] backed by a closure.
pub struct FnTask<F> {
    task_type: TaskType,
    name: String,
    priority: i32,
    run: F,
}

impl<F> FnTask<F> {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

pub fn task_fn<T, F>(task_type: TaskType, name: impl Into<String>, run: F) -> FnTask<F>
where
    T: Send + 'static,
    F: FnOnce(&TaskContext) -> Result<T, TaskError> + Send + 'static,
{
    FnTask {
        task_type,
        name: name.into(),
        priority: 0,
        run,
    }
}

impl<T, F> Task for FnTask<F>
where
    T: Send + 'static,
    F: FnOnce(&TaskContext) -> Result<T, TaskError> + Send + 'static,
{
    type Output = T;

    fn task_type(&self) -> TaskType {
        self.task_type.clone()
    }

    fn presentable_name(&self) -> String {
        self.name.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn execute(self, ctx: &TaskContext) -> Result<T, TaskError> {
        (self.run)(ctx)
    }
}
