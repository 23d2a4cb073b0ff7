use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use cfgmesh_proto::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("storage error: {0}")]
    Storage(#[from] cfgmesh_persist::PersistError),

    #[error("storage error: {0}")]
    AuthStorage(#[from] cfgmesh_auth::AuthStoreError),

    /// Unknown agent on an admin-facing operation. The source lineage
    /// surfaces this as 500 rather than 404; preserved deliberately rather
    /// than "fixed" (see the design notes this implementation follows).
    #[error("agent operation failed")]
    UnknownAgent,
}

impl IntoResponse for ControllerError {
    fn into_response(self) -> Response {
        match self {
            ControllerError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(msg))).into_response()
            }
            ControllerError::Unauthorized => {
                let mut resp =
                    (StatusCode::UNAUTHORIZED, Json(ErrorBody::new("unauthorized"))).into_response();
                resp.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    header::HeaderValue::from_static("Basic realm=Restricted"),
                );
                resp
            }
            ControllerError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("storage error")),
                )
                    .into_response()
            }
            ControllerError::AuthStorage(err) => {
                tracing::error!(error = %err, "agent storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("storage error")),
                )
                    .into_response()
            }
            ControllerError::UnknownAgent => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("agent operation failed")),
            )
                .into_response(),
        }
    }
}
