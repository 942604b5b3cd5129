use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppError;

/// Wire shape of every failed API call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.message,
            code: self.code,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_code_families_to_status() {
        let cases = [
            ("HOUSEHOLD/REQUIRED", StatusCode::BAD_REQUEST),
            ("VALIDATION/ROLE", StatusCode::BAD_REQUEST),
            ("TOKEN/DECODE", StatusCode::BAD_REQUEST),
            ("IMPORT/INVALID_SHAPE", StatusCode::BAD_REQUEST),
            ("EXPORT/NOTHING_NEEDED", StatusCode::BAD_REQUEST),
            ("SUPPLY/NOT_FOUND", StatusCode::NOT_FOUND),
            ("CATEGORY/NOT_FOUND", StatusCode::NOT_FOUND),
            ("Sqlite/2067", StatusCode::INTERNAL_SERVER_ERROR),
            ("RUNTIME/PANIC", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, expected) in cases {
            assert_eq!(AppError::new(code, "x").status_code(), expected, "{code}");
        }
    }

    #[test]
    fn response_carries_status() {
        let response = AppError::new("SUPPLY/NOT_FOUND", "Supply not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
