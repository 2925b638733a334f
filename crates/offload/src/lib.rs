//! # `offload`
//!
//! `offload` keeps async request handlers responsive by running synchronous,
//! CPU-bound work on dedicated threads and handing each outcome back to the
//! caller that asked for it.
//!
//! ## Example
//!
//! ```rust
//! use offload::{Dispatcher, DispatcherConfig, SumHandler};
//!
//! # #[tokio::main]
//! # async fn main() -> offload::Result<()> {
//! let config = DispatcherConfig::default().with_pool_capacity(2);
//! let dispatcher = Dispatcher::spawn(SumHandler::new(config.max_input_bound), config)?;
//!
//! let handle = dispatcher.submit(100).await?;
//! assert_eq!(handle.wait().await?, 5050);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - A bounded pool of execution units with a FIFO backlog
//! - Immediate `PoolExhausted` rejection once the backlog is full
//! - Per-task timeouts and cooperative cancellation
//! - Panics and errors in work functions reported as task failures

pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod handler;
pub mod pool;
pub mod sum;
pub mod task;

mod completion;
mod unit;

pub use config::DispatcherConfig;
pub use error::{Error, ErrorKind, Result};
pub use executor::Dispatcher;
pub use handle::TaskHandle;
pub use handler::{FnHandler, WorkHandler};
pub use pool::PoolStats;
pub use sum::SumHandler;
pub use task::{TaskId, TaskState, TaskStatus};
pub use tokio_util::sync::CancellationToken;
