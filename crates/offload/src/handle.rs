use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::executor::Control;
use crate::task::{TaskId, TaskState, TaskStatus};

/// Caller-side view of a submitted task.
///
/// Clones share the same task: any number of them may `wait` at once and
/// all observe the same terminal state.
#[derive(Clone)]
pub struct TaskHandle<O> {
    id: TaskId,
    state: watch::Receiver<TaskState<O>>,
    control: UnboundedSender<Control>,
}

impl<O> TaskHandle<O>
where
    O: Clone,
{
    pub(crate) fn new(
        id: TaskId,
        state: watch::Receiver<TaskState<O>>,
        control: UnboundedSender<Control>,
    ) -> Self {
        Self { id, state, control }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.state.borrow().status()
    }

    /// Snapshot of the current state, including the outcome once terminal.
    pub fn state(&self) -> TaskState<O> {
        self.state.borrow().clone()
    }

    /// Waits until the task reaches a terminal state.
    pub async fn wait(&self) -> Result<O> {
        let mut state = self.state.clone();
        let terminal = state
            .wait_for(TaskState::is_terminal)
            .await
            .map_err(|_| Error::DispatcherClosed)?
            .clone();
        terminal.into_result()
    }

    /// Requests cancellation. Queued tasks never start; running tasks are
    /// signalled and become `Cancelled` once their unit stops or is
    /// reclaimed. No effect on finished tasks.
    pub fn cancel(&self) {
        if self.status().is_terminal() {
            return;
        }
        if self.control.send(Control::Cancel(self.id)).is_err() {
            tracing::debug!("Dispatcher gone, cannot cancel task {}", self.id);
        }
    }
}

impl<O> fmt::Debug for TaskHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("status", &self.state.borrow().status())
            .finish()
    }
}
