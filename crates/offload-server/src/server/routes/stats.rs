use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use offload::PoolStats;

use crate::server::state::ServerState;
use crate::server::ServerError;

pub async fn pool_stats(
    State(server_state): State<Arc<ServerState>>,
) -> Result<Json<PoolStats>, ServerError> {
    let stats = server_state.dispatcher.stats().await?;
    Ok(Json(stats))
}
