use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::MatchedPath;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use clap::Args;
use offload::DispatcherConfig;
use tower_http::trace::TraceLayer;
use tracing::info_span;

use crate::server::routes::{compute, default, stats};
use crate::server::state::ServerState;

/// Dispatcher settings. Flags and environment variables override values
/// read from `--config`, which override the built-in defaults.
#[derive(Debug, Default, Args)]
pub struct DispatcherArgs {
    /// JSON file with `poolCapacity`, `maxBacklog`, `taskTimeout` (ms), `maxInputBound`
    #[clap(long, env = "OFFLOAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum number of tasks computing at once
    #[clap(long, env = "OFFLOAD_POOL_CAPACITY")]
    pub pool_capacity: Option<usize>,

    /// Maximum number of tasks waiting for a free slot
    #[clap(long, env = "OFFLOAD_MAX_BACKLOG")]
    pub max_backlog: Option<usize>,

    /// Time a task may run before it is reclaimed
    #[clap(long, env = "OFFLOAD_TASK_TIMEOUT_MS")]
    pub task_timeout_ms: Option<u64>,

    /// Larger bounds are clamped to this value
    #[clap(long, env = "OFFLOAD_MAX_INPUT_BOUND")]
    pub max_input_bound: Option<u64>,
}

impl DispatcherArgs {
    pub fn to_config(&self) -> offload::Result<DispatcherConfig> {
        let mut config = match &self.config {
            Some(path) => DispatcherConfig::from_file(path)?,
            None => DispatcherConfig::default(),
        };

        if let Some(pool_capacity) = self.pool_capacity {
            config = config.with_pool_capacity(pool_capacity);
        }
        if let Some(max_backlog) = self.max_backlog {
            config = config.with_max_backlog(max_backlog);
        }
        if let Some(millis) = self.task_timeout_ms {
            config = config.with_task_timeout(Duration::from_millis(millis));
        }
        if let Some(max_input_bound) = self.max_input_bound {
            config = config.with_max_input_bound(max_input_bound);
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn init_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(default::root))
        .route("/health", get(default::health_check))
        .route("/pid", get(default::pid))
        .route("/stats", get(stats::pool_stats))
        .route("/compute/:n", get(compute::compute_sum))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                // Log the matched route's path (with placeholders not filled in).
                let matched_path = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str);
                tracing::debug!("{}", request.uri());

                info_span!(
                    "http_request",
                    method = ?request.method(),
                    matched_path,
                )
            }),
        )
}
