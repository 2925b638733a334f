use anyhow::Result;
use offload::{Dispatcher, DispatcherConfig, SumHandler};

/// Represents the state of the server.
#[derive(Clone)]
pub struct ServerState {
    pub dispatcher: Dispatcher<SumHandler>,
}

impl ServerState {
    /// Starts the dispatcher; must run inside the Tokio runtime.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        let handler = SumHandler::new(config.max_input_bound);
        let dispatcher = Dispatcher::spawn(handler, config)?;

        Ok(Self { dispatcher })
    }
}
