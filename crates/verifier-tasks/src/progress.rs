use tokio::sync::broadcast;

use crate::{TaskId, TaskProgress, TaskState};

#[derive(Debug, Clone, PartialEq)]
pub enum TaskProgressEvent {
    Started { id: TaskId, name: String },
    Progress { id: TaskId, progress: TaskProgress },
    Finished { id: TaskId, state: TaskState },
}

pub type TaskProgressReceiver = broadcast::Receiver<TaskProgressEvent>;

/// Fan-out of task lifecycle events. Sending never blocks and events are
/// dropped when nobody listens.
#[derive(Clone)]
pub(crate) struct ProgressSender {
    tx: broadcast::Sender<TaskProgressEvent>,
}

impl ProgressSender {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> TaskProgressReceiver {
        self.tx.subscribe()
    }

    pub(crate) fn started(&self, id: TaskId, name: &str) {
        let _ = self.tx.send(TaskProgressEvent::Started {
            id,
            name: name.to_string(),
        });
    }

    pub(crate) fn progress(&self, id: TaskId, progress: TaskProgress) {
        let _ = self.tx.send(TaskProgressEvent::Progress { id, progress });
    }

    pub(crate) fn finished(&self, id: TaskId, state: TaskState) {
        let _ = self.tx.send(TaskProgressEvent::Finished { id, state });
    }
}
