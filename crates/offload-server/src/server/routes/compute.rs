use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use offload::TaskHandle;
use tokio::time::Instant;

use crate::server::data_models::ComputeResponse;
use crate::server::state::ServerState;
use crate::server::ServerError;

/// Cancels the task if the request future is dropped before the outcome
/// arrives, e.g. because the client disconnected.
struct CancelOnDrop(Option<TaskHandle<u128>>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0.take();
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            tracing::debug!("Request dropped, cancelling task {}", handle.id());
            handle.cancel();
        }
    }
}

fn parse_bound(raw: &str) -> Result<i64, offload::Error> {
    raw.trim()
        .parse()
        .map_err(|_| offload::Error::InvalidInput(format!("`{}` is not an integer", raw)))
}

pub async fn compute_sum(
    State(server_state): State<Arc<ServerState>>,
    Path(raw): Path<String>,
) -> Result<(StatusCode, Json<ComputeResponse>), ServerError> {
    let n = parse_bound(&raw)?;

    let start = Instant::now();
    let handle = server_state.dispatcher.submit(n).await?;
    tracing::debug!("Task {} submitted for n = {}", handle.id(), n);

    let guard = CancelOnDrop(Some(handle.clone()));
    let outcome = handle.wait().await;
    guard.disarm();
    let sum = outcome?;

    tracing::trace!(
        "Task {} took {} ms",
        handle.id(),
        start.elapsed().as_millis()
    );

    Ok((StatusCode::CREATED, Json(ComputeResponse::completed(sum))))
}
