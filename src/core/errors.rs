use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::state::CameraId;

/// Failure taxonomy shared by the connection core and the camera controls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("camera {0} is not configured")]
    NotFound(CameraId),

    #[error("camera {0} is unavailable")]
    Unavailable(CameraId),

    #[error("camera {camera_id} sent no frame within {timeout:?}")]
    StreamTimeout { camera_id: CameraId, timeout: Duration },

    #[error("camera {camera_id} transport error: {reason}")]
    TransportError { camera_id: CameraId, reason: String },

    #[error("camera {camera_id} gave up after {attempts} reconnect attempts")]
    RetryBudgetExhausted { camera_id: CameraId, attempts: u32 },

    #[error("camera {camera_id} is not streaming")]
    NotStreaming { camera_id: CameraId },

    #[error("camera {camera_id} connect attempt was superseded")]
    Superseded { camera_id: CameraId },

    #[error("{action} failed for camera {camera_id}: {reason}")]
    RequestFailed {
        camera_id: CameraId,
        action: &'static str,
        reason: String,
    },
}

impl CameraError {
    pub fn request_failed(camera_id: CameraId, action: &'static str, err: anyhow::Error) -> Self {
        Self::RequestFailed {
            camera_id,
            action,
            reason: format!("{err:#}"),
        }
    }

    /// Connection failures that the reconnection scheduler recovers from.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::StreamTimeout { .. } | Self::TransportError { .. }
        )
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CameraError> for AppError {
    fn from(value: CameraError) -> Self {
        let status = match &value {
            CameraError::NotFound(_) => StatusCode::NOT_FOUND,
            CameraError::NotStreaming { .. } | CameraError::Superseded { .. } => {
                StatusCode::CONFLICT
            }
            CameraError::RequestFailed { .. } => StatusCode::BAD_GATEWAY,
            CameraError::Unavailable(_)
            | CameraError::StreamTimeout { .. }
            | CameraError::TransportError { .. }
            | CameraError::RetryBudgetExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::{AppError, CameraError};

    #[test]
    fn maps_taxonomy_to_http_status() {
        let not_found = AppError::from(CameraError::NotFound(9));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let offline = AppError::from(CameraError::Unavailable(1));
        assert_eq!(offline.status(), StatusCode::SERVICE_UNAVAILABLE);

        let failed = AppError::from(CameraError::RequestFailed {
            camera_id: 2,
            action: "snapshot",
            reason: "HTTP 500".to_string(),
        });
        assert_eq!(failed.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn only_connection_failures_are_recoverable() {
        assert!(CameraError::Unavailable(1).is_recoverable());
        assert!(
            CameraError::TransportError {
                camera_id: 1,
                reason: "reset".to_string()
            }
            .is_recoverable()
        );
        assert!(!CameraError::NotStreaming { camera_id: 1 }.is_recoverable());
        assert!(!CameraError::NotFound(3).is_recoverable());
    }
}
