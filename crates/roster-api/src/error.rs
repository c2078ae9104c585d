use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use roster_types::api::StatusResponse;
use roster_users::UserError;
use tracing::error;

/// Error half of every handler: a status code plus a `{status, message}`
/// body carrying the error code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        let status = match &err {
            UserError::DuplicateUser => StatusCode::CONFLICT,
            UserError::UserNotFound => StatusCode::NOT_FOUND,
            e if e.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
            UserError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                error!("User operation failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.code())
    }
}

/// A body that is not valid JSON for the request type is reported with the
/// decoder's message, like a validation failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = StatusResponse {
            status: self.status.as_u16(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
