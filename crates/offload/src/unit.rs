use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionSender, Outcome};
use crate::error::{Error, Result};
use crate::handler::WorkHandler;
use crate::task::TaskId;

/// A dedicated OS thread bound to a single task.
///
/// The thread only sees the input and its completion sender; it posts one
/// message and exits.
pub(crate) struct ExecutionUnit<THandler>
where
    THandler: WorkHandler,
{
    task_id: TaskId,
    input: THandler::Input,
    handler: Arc<THandler>,
    cancel: CancellationToken,
    completion: CompletionSender<THandler::Output>,
}

impl<THandler> ExecutionUnit<THandler>
where
    THandler: WorkHandler,
{
    pub(crate) fn new(
        task_id: TaskId,
        input: THandler::Input,
        handler: Arc<THandler>,
        cancel: CancellationToken,
        completion: CompletionSender<THandler::Output>,
    ) -> Self {
        Self {
            task_id,
            input,
            handler,
            cancel,
            completion,
        }
    }

    /// Starts the thread. Failing to create it is reported as
    /// `WorkerSpawnFailure`; the task never runs in that case.
    pub(crate) fn spawn(self, stack_size: Option<usize>) -> Result<()> {
        let mut builder = thread::Builder::new().name(format!("offload-{}", self.task_id));
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }

        builder
            .spawn(move || self.run())
            .map(|_detached| ())
            .map_err(|err| Error::WorkerSpawnFailure(err.to_string()))
    }

    fn run(self) {
        let Self {
            task_id,
            input,
            handler,
            cancel,
            completion,
        } = self;

        tracing::trace!("Unit started for task {}", task_id);
        let result = catch_unwind(AssertUnwindSafe(|| handler.handle(input, &cancel)));

        let outcome = match result {
            Ok(Ok(output)) => Outcome::Completed(output),
            Ok(Err(err)) => {
                if cancel.is_cancelled() {
                    Outcome::Failed(Error::Cancelled)
                } else {
                    Outcome::Failed(Error::WorkerExecutionError(format!("{:#}", err)))
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("Work function for task {} panicked: {}", task_id, message);
                Outcome::Failed(Error::WorkerExecutionError(format!("panicked: {}", message)))
            }
        };

        completion.post(outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionChannel;
    use crate::handler::FnHandler;

    #[tokio::test]
    async fn test_unit_posts_single_completion() {
        let (channel, mut rx) = CompletionChannel::new();
        let id = TaskId::new_v4();
        let handler = Arc::new(FnHandler::from(|x: u64| x * 2));

        ExecutionUnit::new(id, 21, handler, CancellationToken::new(), channel.sender_for(id))
            .spawn(None)
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.task_id, id);
        assert!(matches!(msg.outcome, Outcome::Completed(42)));

        drop(channel);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unit_captures_panic() {
        let (channel, mut rx) = CompletionChannel::<u64>::new();
        let id = TaskId::new_v4();
        let handler = Arc::new(FnHandler::from(|x: u64| -> u64 {
            if x > 0 {
                panic!("work function fault");
            }
            x
        }));

        ExecutionUnit::new(id, 1, handler, CancellationToken::new(), channel.sender_for(id))
            .spawn(None)
            .unwrap();

        let msg = rx.recv().await.unwrap();
        match msg.outcome {
            Outcome::Failed(Error::WorkerExecutionError(message)) => {
                assert!(message.contains("work function fault"), "{}", message);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
