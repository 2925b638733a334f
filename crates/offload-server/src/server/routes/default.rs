use axum::http::StatusCode;
use axum::Json;

use crate::server::data_models::PidResponse;

pub async fn root() -> &'static str {
    "Hello World!"
}

pub async fn health_check() -> StatusCode {
    tracing::trace!("Health check request received.");
    StatusCode::OK
}

/// Identifies the serving process, to check where requests land.
pub async fn pid() -> Json<PidResponse> {
    Json(PidResponse {
        processid: std::process::id(),
    })
}
