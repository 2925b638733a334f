use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{Error, Result};

pub type TaskId = Uuid;

/// Lifecycle position of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Status together with its outcome. A result only exists on
/// `Completed`, an error only on `Failed` and `TimedOut`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState<O> {
    Pending,
    Running,
    Completed(O),
    Failed(Error),
    TimedOut(Error),
    Cancelled,
}

impl<O> TaskState<O> {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Running => TaskStatus::Running,
            TaskState::Completed(_) => TaskStatus::Completed,
            TaskState::Failed(_) => TaskStatus::Failed,
            TaskState::TimedOut(_) => TaskStatus::TimedOut,
            TaskState::Cancelled => TaskStatus::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Converts a terminal state into the caller-facing result.
    pub fn into_result(self) -> Result<O> {
        match self {
            TaskState::Completed(output) => Ok(output),
            TaskState::Failed(err) | TaskState::TimedOut(err) => Err(err),
            TaskState::Cancelled => Err(Error::Cancelled),
            // Only reachable if called before the task finished
            TaskState::Pending | TaskState::Running => Err(Error::DispatcherClosed),
        }
    }
}

/// Write side of a task's state, held by the dispatcher only.
///
/// Allows `Pending -> Running` and exactly one transition into a terminal
/// state; anything after that is ignored.
#[derive(Debug)]
pub(crate) struct TaskSlot<O> {
    id: TaskId,
    tx: watch::Sender<TaskState<O>>,
}

impl<O> TaskSlot<O> {
    pub(crate) fn new(id: TaskId) -> (Self, watch::Receiver<TaskState<O>>) {
        let (tx, rx) = watch::channel(TaskState::Pending);
        (Self { id, tx }, rx)
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.tx.borrow().status()
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if matches!(state, TaskState::Pending) {
                *state = TaskState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Returns `false` if the task had already reached a terminal state.
    pub(crate) fn finish(&self, terminal: TaskState<O>) -> bool {
        debug_assert!(terminal.is_terminal());
        let mut terminal = Some(terminal);
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            match terminal.take() {
                Some(next) => {
                    *state = next;
                    true
                }
                None => false,
            }
        })
    }
}
