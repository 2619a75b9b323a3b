//! Mapping from `ZkvError` to HTTP responses
//!
//! Every failure body is `{"success": false, "error": "..."}`. Authentication
//! failures all read "authentication failed"; the specific reason only goes to
//! the log.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use zkv_core::api::Ack;
use zkv_core::{AuthFailure, ZkvError};

#[derive(Debug)]
pub struct ApiError(pub ZkvError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ZkvError::Protocol(_) => StatusCode::BAD_REQUEST,
            ZkvError::Auth(AuthFailure::AlreadyRegistered) => StatusCode::CONFLICT,
            ZkvError::Auth(_) => StatusCode::UNAUTHORIZED,
            ZkvError::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ZkvError::Transport(_) => StatusCode::BAD_GATEWAY,
            ZkvError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ZkvError> for ApiError {
    fn from(e: ZkvError) -> Self {
        ApiError(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError(ZkvError::protocol(format!("multipart: {}", e.body_text())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            ZkvError::Auth(reason) => {
                tracing::debug!(reason = %reason, "request refused");
            }
            e if status.is_server_error() => {
                tracing::error!(kind = e.kind(), error = %e, "request failed");
            }
            e => {
                tracing::debug!(kind = e.kind(), error = %e, "request rejected");
            }
        }
        // Internal details stay in the log
        let message = match &self.0 {
            ZkvError::Storage(_) | ZkvError::Io(_) | ZkvError::Other(_) | ZkvError::Config(_) => {
                "internal error".to_string()
            }
            e => e.to_string(),
        };
        (status, Json(Ack::failed(message))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ZkvError::protocol("x"), StatusCode::BAD_REQUEST),
            (AuthFailure::ProofRejected.into(), StatusCode::UNAUTHORIZED),
            (AuthFailure::AlreadyRegistered.into(), StatusCode::CONFLICT),
            (ZkvError::integrity("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (ZkvError::transport("x"), StatusCode::BAD_GATEWAY),
            (ZkvError::not_found("x"), StatusCode::NOT_FOUND),
            (ZkvError::storage("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn storage_detail_is_not_exposed() {
        let resp = ApiError(ZkvError::storage("disk /srv/secret full")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
