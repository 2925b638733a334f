use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::completion::{Completion, CompletionChannel, Outcome};
use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::handle::TaskHandle;
use crate::handler::WorkHandler;
use crate::pool::{Admission, ExecutionPool, PoolStats, Queued};
use crate::task::{TaskId, TaskSlot, TaskState, TaskStatus};
use crate::unit::ExecutionUnit;

/// A task accepted by the dispatcher but not yet bound to a unit.
pub(crate) struct PendingTask<THandler>
where
    THandler: WorkHandler,
{
    /// Identifier
    id: TaskId,

    /// Work function argument
    input: THandler::Input,

    /// State writer
    slot: TaskSlot<THandler::Output>,

    /// Instant when this task was submitted
    queue_time: Instant,
}

impl<THandler> Queued for PendingTask<THandler>
where
    THandler: WorkHandler,
{
    fn task_id(&self) -> TaskId {
        self.id
    }
}

/// Bookkeeping for a bound slot.
struct ActiveUnit<O> {
    slot: TaskSlot<O>,
    cancel: CancellationToken,
    timer: AbortHandle,
    cancel_requested: bool,
    started: Instant,
}

/// Requests from dispatcher clones.
pub(crate) enum Command<THandler>
where
    THandler: WorkHandler,
{
    Submit {
        entry: PendingTask<THandler>,
        reply: oneshot::Sender<Result<()>>,
    },
    Stats(oneshot::Sender<PoolStats>),
    Stop(oneshot::Sender<()>),
}

/// Signals addressed to a single task.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Control {
    Cancel(TaskId),
    Timeout(TaskId),
}

/// Accepts submissions from async request handlers and runs them on a
/// bounded set of dedicated threads.
///
/// Cloning is cheap; every clone talks to the same dispatch loop.
pub struct Dispatcher<THandler>
where
    THandler: WorkHandler,
{
    handler: Arc<THandler>,
    commands: UnboundedSender<Command<THandler>>,
    control: UnboundedSender<Control>,
}

impl<THandler> Dispatcher<THandler>
where
    THandler: WorkHandler,
{
    /// Starts the dispatch loop on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(handler: THandler, config: DispatcherConfig) -> Result<Self> {
        config.validate()?;

        let handler = Arc::new(handler);
        let (commands, command_rx) = unbounded_channel();
        let (control, control_rx) = unbounded_channel();
        let (completions, completion_rx) = CompletionChannel::new();

        tracing::info!(
            "Starting dispatcher: {} slots, backlog {}, timeout {}ms",
            config.pool_capacity,
            config.max_backlog,
            config.task_timeout.as_millis()
        );

        let dispatch_loop = DispatchLoop {
            handler: handler.clone(),
            pool: ExecutionPool::new(config.pool_capacity, config.max_backlog),
            completions,
            control: control.clone(),
            stats: PoolStats::default(),
            config,
        };
        tokio::spawn(dispatch_loop.run(command_rx, control_rx, completion_rx));

        Ok(Self {
            handler,
            commands,
            control,
        })
    }

    /// Validates `input` and hands it to the pool.
    ///
    /// Returns as soon as the task is bound or queued; fails with
    /// `InvalidInput` before anything is allocated and with
    /// `PoolExhausted` when slots and backlog are both full.
    pub async fn submit(&self, input: THandler::Input) -> Result<TaskHandle<THandler::Output>> {
        self.handler.validate(&input).map_err(Error::InvalidInput)?;

        let id = TaskId::new_v4();
        let (slot, state_rx) = TaskSlot::new(id);
        let entry = PendingTask {
            id,
            input,
            slot,
            queue_time: Instant::now(),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                entry,
                reply: reply_tx,
            })
            .map_err(|_| Error::DispatcherClosed)?;

        let mut abandoned = AbandonGuard {
            id,
            control: &self.control,
            armed: true,
        };
        let admitted = reply_rx.await;
        abandoned.armed = false;
        admitted.map_err(|_| Error::DispatcherClosed)??;

        Ok(TaskHandle::new(id, state_rx, self.control.clone()))
    }

    /// Submits `input` and waits for its outcome.
    pub async fn run(&self, input: THandler::Input) -> Result<THandler::Output> {
        self.submit(input).await?.wait().await
    }

    pub async fn stats(&self) -> Result<PoolStats> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats(tx))
            .map_err(|_| Error::DispatcherClosed)?;
        rx.await.map_err(|_| Error::DispatcherClosed)
    }

    /// Stops admitting work and cancels everything still queued or running.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stop(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn handler(&self) -> &THandler {
        &self.handler
    }
}

impl<THandler> Clone for Dispatcher<THandler>
where
    THandler: WorkHandler,
{
    fn clone(&self) -> Self {
        Dispatcher {
            handler: self.handler.clone(),
            commands: self.commands.clone(),
            control: self.control.clone(),
        }
    }
}

/// Cancels a submission whose caller stopped waiting before the handle
/// was returned. Nobody else can cancel such a task.
struct AbandonGuard<'a> {
    id: TaskId,
    control: &'a UnboundedSender<Control>,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Submission of task {} abandoned", self.id);
            let _ = self.control.send(Control::Cancel(self.id));
        }
    }
}

/// Sole owner of the pool and of every task's state writer.
struct DispatchLoop<THandler>
where
    THandler: WorkHandler,
{
    handler: Arc<THandler>,
    config: DispatcherConfig,
    pool: ExecutionPool<PendingTask<THandler>, ActiveUnit<THandler::Output>>,
    completions: CompletionChannel<THandler::Output>,
    control: UnboundedSender<Control>,
    stats: PoolStats,
}

impl<THandler> DispatchLoop<THandler>
where
    THandler: WorkHandler,
{
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command<THandler>>,
        mut control: UnboundedReceiver<Control>,
        mut completions: UnboundedReceiver<Completion<THandler::Output>>,
    ) {
        let mut accepting = true;

        loop {
            tokio::select! {
                cmd = commands.recv(), if accepting => match cmd {
                    Some(Command::Submit { entry, reply }) => self.on_submit(entry, reply),
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::Stop(reply)) => {
                        self.stop();
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        tracing::debug!("All dispatcher handles dropped, draining in-flight tasks");
                        accepting = false;
                    }
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                Some(signal) = control.recv() => self.on_control(signal),
                else => break,
            }

            if !accepting && self.pool.active_len() == 0 && self.pool.backlog_len() == 0 {
                break;
            }
        }

        tracing::info!("Dispatcher stopped");
    }

    fn on_submit(&mut self, entry: PendingTask<THandler>, reply: oneshot::Sender<Result<()>>) {
        let id = entry.id;
        match self.pool.admit(entry) {
            Admission::Bind(entry) => {
                self.bind(entry);
                self.acknowledge(id, reply);
            }
            Admission::Queued { position } => {
                tracing::debug!("Task {} queued at position {}", id, position);
                self.acknowledge(id, reply);
            }
            Admission::Rejected(_, err) => {
                tracing::warn!("Rejecting task {}: {}", id, err);
                self.stats.rejected += 1;
                let _ = reply.send(Err(err));
            }
        }
    }

    /// The submitter may have gone away while the command was in flight, in
    /// which case its `Cancel` could have arrived before the task existed.
    fn acknowledge(&mut self, id: TaskId, reply: oneshot::Sender<Result<()>>) {
        if reply.send(Ok(())).is_err() {
            self.cancel(id);
        }
    }

    /// Starts a unit for `entry`. On spawn failure the task fails without
    /// ever running and no slot is taken.
    fn bind(&mut self, entry: PendingTask<THandler>) {
        let PendingTask {
            id,
            input,
            slot,
            queue_time,
        } = entry;

        tracing::trace!(
            "Binding task {}, submitted {}ms ago",
            id,
            queue_time.elapsed().as_millis()
        );

        let cancel = CancellationToken::new();
        let unit = ExecutionUnit::new(
            id,
            input,
            self.handler.clone(),
            cancel.clone(),
            self.completions.sender_for(id),
        );

        match unit.spawn(self.config.worker_stack_size) {
            Ok(()) => {
                slot.mark_running();
                let timer = self.arm_timeout(id);
                self.pool.occupy(
                    id,
                    ActiveUnit {
                        slot,
                        cancel,
                        timer,
                        cancel_requested: false,
                        started: Instant::now(),
                    },
                );
                tracing::debug!("Task {} running", id);
            }
            Err(err) => {
                tracing::error!("Task {} could not start: {}", id, err);
                self.finish(&slot, TaskState::Failed(err));
            }
        }
    }

    fn arm_timeout(&self, id: TaskId) -> AbortHandle {
        let control = self.control.clone();
        let timeout = self.config.task_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = control.send(Control::Timeout(id));
        })
        .abort_handle()
    }

    fn on_completion(&mut self, completion: Completion<THandler::Output>) {
        let Completion { task_id, outcome } = completion;

        let Some(unit) = self.pool.release(&task_id) else {
            tracing::debug!("Discarding late completion for task {}", task_id);
            return;
        };
        unit.timer.abort();

        let state = match outcome {
            _ if unit.cancel_requested => TaskState::Cancelled,
            Outcome::Completed(output) => TaskState::Completed(output),
            Outcome::Failed(err) => {
                tracing::error!("Task {} failed: {}", task_id, err);
                TaskState::Failed(err)
            }
        };
        tracing::debug!(
            "Task {} finished as {} after {}ms",
            task_id,
            state.status(),
            unit.started.elapsed().as_millis()
        );

        self.finish(&unit.slot, state);
        self.refill();
    }

    fn on_control(&mut self, signal: Control) {
        match signal {
            Control::Cancel(id) => self.cancel(id),
            Control::Timeout(id) => self.time_out(id),
        }
    }

    fn cancel(&mut self, id: TaskId) {
        if let Some(entry) = self.pool.remove_pending(&id) {
            tracing::debug!("Cancelled queued task {}", id);
            self.finish(&entry.slot, TaskState::Cancelled);
            return;
        }

        match self.pool.active_mut(&id) {
            Some(unit) if !unit.cancel_requested => {
                tracing::debug!("Signalling running task {} to stop", id);
                unit.cancel_requested = true;
                unit.cancel.cancel();
            }
            Some(_) => {}
            None => tracing::trace!("Cancel for finished task {}", id),
        }
    }

    /// Reclaims the slot regardless of whether the unit has stopped; any
    /// message it posts later is discarded.
    fn time_out(&mut self, id: TaskId) {
        let Some(unit) = self.pool.release(&id) else {
            return;
        };
        unit.cancel.cancel();

        let state = if unit.cancel_requested {
            TaskState::Cancelled
        } else {
            tracing::warn!(
                "Task {} exceeded {}ms, reclaiming its slot",
                id,
                self.config.task_timeout.as_millis()
            );
            TaskState::TimedOut(Error::WorkerTimeout(self.config.task_timeout))
        };

        self.finish(&unit.slot, state);
        self.refill();
    }

    fn refill(&mut self) {
        while let Some(next) = self.pool.next_ready() {
            self.bind(next);
        }
    }

    fn stop(&mut self) {
        let (pending, active) = self.pool.drain();
        tracing::info!(
            "Stopping dispatcher: cancelling {} queued and {} running tasks",
            pending.len(),
            active.len()
        );

        for entry in pending {
            self.finish(&entry.slot, TaskState::Cancelled);
        }
        for (_, unit) in active {
            unit.timer.abort();
            unit.cancel.cancel();
            self.finish(&unit.slot, TaskState::Cancelled);
        }
    }

    fn finish(&mut self, slot: &TaskSlot<THandler::Output>, state: TaskState<THandler::Output>) {
        let status = state.status();
        if !slot.finish(state) {
            tracing::debug!("Task {} already in state {}", slot.id(), slot.status());
            return;
        }
        match status {
            TaskStatus::Completed => self.stats.completed += 1,
            TaskStatus::Failed => self.stats.failed += 1,
            TaskStatus::TimedOut => self.stats.timed_out += 1,
            TaskStatus::Cancelled => self.stats.cancelled += 1,
            TaskStatus::Pending | TaskStatus::Running => {}
        }
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            capacity: self.pool.capacity(),
            max_backlog: self.pool.max_backlog(),
            active: self.pool.active_len(),
            queued: self.pool.backlog_len(),
            ..self.stats.clone()
        }
    }
}
