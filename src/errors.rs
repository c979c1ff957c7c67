use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::bus::BusError;
use crate::identity::AuthError;
use crate::models::message::MessageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Unauthorized(e) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_credentials",
                e.to_string(),
            ),
            AppError::InvalidMessage(e) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_message",
                e.to_string(),
            ),
            AppError::Bus(BusError::CapacityExceeded { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "capacity_error",
                "too_many_streams",
                "notification stream capacity reached".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        let mut response = (status, body).into_response();

        // Streams free up as clients disconnect; hint a retry.
        if matches!(self, AppError::Bus(_)) {
            response.headers_mut().insert(
                "retry-after",
                axum::http::HeaderValue::from_static("5"),
            );
        }

        response
    }
}
