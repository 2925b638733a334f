use std::marker::PhantomData;

use tokio_util::sync::CancellationToken;

/// Trait representing a synchronous, CPU-bound work function that runs on
/// its own execution unit.
///
/// One handler instance is shared by every unit of a dispatcher, so
/// `handle` takes `&self` and may run on several threads at once.
pub trait WorkHandler
where
    Self: Send + Sync + Sized + 'static,
{
    type Input: Send + 'static;
    type Output: Clone + Send + Sync + 'static;

    /// Checks an input before a task is allocated for it.
    fn validate(&self, _input: &Self::Input) -> Result<(), String> {
        Ok(())
    }

    /// Runs the work to completion. Long-running implementations should
    /// poll `cancel` at safe points and bail out once it fires.
    fn handle(&self, input: Self::Input, cancel: &CancellationToken)
        -> anyhow::Result<Self::Output>;
}

/// Adapts a plain function into a [`WorkHandler`]. The function cannot
/// observe cancellation.
pub struct FnHandler<F, Input, Output>
where
    F: Fn(Input) -> Output,
{
    op: F,
    _req: PhantomData<fn(Input)>,
    _resp: PhantomData<fn() -> Output>,
}

impl<F, Input, Output> FnHandler<F, Input, Output>
where
    F: Fn(Input) -> Output,
{
    pub fn new(op: F) -> Self {
        Self {
            op,
            _req: PhantomData,
            _resp: PhantomData,
        }
    }
}

impl<F, Input, Output> From<F> for FnHandler<F, Input, Output>
where
    F: Fn(Input) -> Output,
{
    fn from(op: F) -> Self {
        Self::new(op)
    }
}

impl<F, Input, Output> WorkHandler for FnHandler<F, Input, Output>
where
    F: Fn(Input) -> Output + Send + Sync + 'static,
    Input: Send + 'static,
    Output: Clone + Send + Sync + 'static,
{
    type Input = Input;
    type Output = Output;

    fn handle(&self, input: Input, _cancel: &CancellationToken) -> anyhow::Result<Output> {
        Ok((self.op)(input))
    }
}
