use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, reason_phrase, ErrorResponse};

/// Maps a domain error to its HTTP status and JSON body
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::VALIDATION_FAILED),
        AppError::PayloadTooLarge { .. } => {
            (kinds::VALIDATION_ERROR, error_codes::PAYLOAD_TOO_LARGE)
        }
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID),
        AppError::Forbidden(_) => (kinds::AUTHORIZATION_ERROR, error_codes::FORBIDDEN),
        AppError::NotFound("message") => (kinds::NOT_FOUND_ERROR, error_codes::MESSAGE_NOT_FOUND),
        AppError::NotFound("conversation") => {
            (kinds::NOT_FOUND_ERROR, error_codes::CONVERSATION_NOT_FOUND)
        }
        AppError::NotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::RESOURCE_NOT_FOUND),
        AppError::StoreUnavailable(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::STORE_UNAVAILABLE,
        ),
        AppError::Config(_)
        | AppError::StartServer(_)
        | AppError::Transport(_)
        | AppError::Internal => (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR),
    };

    // Backend details stay in the logs
    let message = match err {
        AppError::StoreUnavailable(detail) => {
            tracing::error!(error = %detail, "store unavailable");
            "store unavailable".to_string()
        }
        AppError::Config(_) | AppError::StartServer(_) | AppError::Transport(_) => {
            tracing::error!(error = %err, "internal failure surfaced to HTTP");
            "internal server error".to_string()
        }
        other => other.to_string(),
    };

    let mut response = ErrorResponse::new(
        reason_phrase(status.as_u16()),
        &message,
        status.as_u16(),
        error_type,
        code,
    );
    if let AppError::PayloadTooLarge { limit } = err {
        response = response.with_details(format!("limit {limit} bytes"));
    }

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, body) = map_error(err);
    HttpResponse::build(status).json(body)
}
