mod init;
mod state;
pub mod data_models;
pub mod routes;
pub mod utils;

pub use init::{init_router, DispatcherArgs};
pub use state::ServerState;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use offload::ErrorKind;
use thiserror::Error;

use crate::server::data_models::ErrorResponse;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Offload(#[from] offload::Error),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        let ServerError::Offload(err) = self;
        match err.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::PoolExhausted => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Cancelled => StatusCode::CONFLICT,
            ErrorKind::WorkerSpawnFailure
            | ErrorKind::WorkerExecutionError
            | ErrorKind::WorkerTimeout
            | ErrorKind::DispatcherClosed
            | ErrorKind::InvalidConfig => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let ServerError::Offload(err) = &self;
        let kind = err.kind();
        let body = ErrorResponse {
            error: match kind {
                ErrorKind::InvalidInput => "invalid input".to_string(),
                _ => err.to_string(),
            },
            code: kind.code(),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            (status, [(header::RETRY_AFTER, "1")], Json(body)).into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (offload::Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                offload::Error::PoolExhausted {
                    active: 1,
                    queued: 0,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (offload::Error::Cancelled, StatusCode::CONFLICT),
            (
                offload::Error::WorkerTimeout(Duration::from_secs(1)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                offload::Error::WorkerExecutionError("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ServerError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
