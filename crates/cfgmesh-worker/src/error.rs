use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use cfgmesh_proto::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no configuration loaded")]
    Unconfigured,

    #[error("outbound request failed: {0}")]
    Hit(#[from] reqwest::Error),
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        match self {
            WorkerError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(msg))).into_response()
            }
            WorkerError::Unconfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::new("no configuration")),
            )
                .into_response(),
            WorkerError::Hit(err) => {
                tracing::warn!(error = %err, "outbound hit failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ErrorBody::new(format!("outbound request failed: {err}"))),
                )
                    .into_response()
            }
        }
    }
}
