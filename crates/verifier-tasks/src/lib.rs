//! Priority task manager: per-type worker pools, cooperative cancellation,
//! deadlines, lifecycle callbacks and a bounded history of finished tasks.

mod descriptor;
mod error;
mod manager;
mod pool;
mod progress;
mod task;

pub use descriptor::{TaskDescriptor, TaskId, TaskProgress, TaskState};
pub use error::{TaskError, TaskManagerError};
pub use manager::{EnqueueOptions, TaskCallbacks, TaskManager, TaskManagerConfig};
pub use progress::{TaskProgressEvent, TaskProgressReceiver};
pub use task::{task_fn, FnTask, Task, TaskContext, TaskType};
pub use tokio_util::sync::CancellationToken;

pub(crate) use verifier_cache::panic_message;
