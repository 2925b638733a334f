//! Conduit carrying each execution unit's single terminal message back to
//! the dispatcher.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::Error;
use crate::task::TaskId;

/// What an execution unit reports when its work function returns.
#[derive(Debug)]
pub(crate) enum Outcome<O> {
    Completed(O),
    Failed(Error),
}

/// Terminal message for one task.
#[derive(Debug)]
pub(crate) struct Completion<O> {
    pub task_id: TaskId,
    pub outcome: Outcome<O>,
}

/// Write end handed to exactly one execution unit. Posting consumes it, so
/// a unit cannot report twice.
#[derive(Debug)]
pub(crate) struct CompletionSender<O> {
    task_id: TaskId,
    tx: UnboundedSender<Completion<O>>,
}

impl<O> CompletionSender<O> {
    pub(crate) fn post(self, outcome: Outcome<O>) {
        let completion = Completion {
            task_id: self.task_id,
            outcome,
        };
        if self.tx.send(completion).is_err() {
            tracing::debug!(
                "Dispatcher gone, dropping completion for task {}",
                self.task_id
            );
        }
    }
}

/// Shared read end plus the factory for per-task senders.
pub(crate) struct CompletionChannel<O> {
    tx: UnboundedSender<Completion<O>>,
}

impl<O> CompletionChannel<O> {
    pub(crate) fn new() -> (Self, UnboundedReceiver<Completion<O>>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn sender_for(&self, task_id: TaskId) -> CompletionSender<O> {
        CompletionSender {
            task_id,
            tx: self.tx.clone(),
        }
    }
}
