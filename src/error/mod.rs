use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use base64::DecodeError as Base64Error;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use sqlx::Error as SqlxError;
use std::io::Error as IoError;
use ts_rs::TS;

mod http;

pub use http::ErrorBody;

/// A structured application error that can be serialized and returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message that can be shown directly to the user.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    #[ts(as = "Option<HashMap<String, String>>", optional)]
    pub context: HashMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;
pub type Result<T> = AppResult<T>;

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";
    /// Code used for errors created from free-form messages.
    pub const GENERIC_CODE: &'static str = "APP/GENERIC";
    /// Code used when a handler panics inside the dispatch fence.
    pub const PANIC_CODE: &'static str = "RUNTIME/PANIC";

    /// Construct a new application error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: HashMap::new(),
            cause: None,
        }
    }

    /// Shorthand for a `VALIDATION/<field>` error.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::new(format!("VALIDATION/{}", field.to_ascii_uppercase()), message)
            .with_context("field", field)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Extends the context map with additional key/value pairs.
    pub fn with_contexts<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }

    /// Client-caused failures: missing or malformed input.
    pub fn is_validation(&self) -> bool {
        let code = self.code.as_str();
        code.starts_with("VALIDATION/")
            || code.starts_with("TOKEN/")
            || code.starts_with("JSON/")
            || code.starts_with("IMPORT/INVALID")
            || code == "HOUSEHOLD/REQUIRED"
            || code == "SUPPLY/INVALID_STATUS"
            || code == "MEMBER/INVALID_ROLE"
            || code == "EXPORT/NOTHING_NEEDED"
    }

    pub fn is_not_found(&self) -> bool {
        self.code.ends_with("/NOT_FOUND") || self.code == "SQLX/ROW_NOT_FOUND"
    }

    /// Emit this error through `tracing` with a stable event name.
    pub fn log_with_event(&self, event: &'static str) {
        if self.is_validation() || self.is_not_found() {
            tracing::warn!(
                target: "homestock",
                event,
                code = %self.code,
                message = %self.message,
                context = ?self.context
            );
        } else {
            tracing::error!(
                target: "homestock",
                event,
                code = %self.code,
                message = %self.message,
                context = ?self.context,
                cause = ?self.cause.as_deref().map(AppError::message)
            );
        }
    }
}

/// Human-readable text from a panic payload.
pub fn panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        AppError::new(AppError::GENERIC_CODE, message)
    }
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }

            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SerdeJsonError> for AppError {
    fn from(error: SerdeJsonError) -> Self {
        let code = if error.is_data() {
            "JSON/DATA"
        } else if error.is_syntax() {
            "JSON/SYNTAX"
        } else if error.is_eof() {
            "JSON/EOF"
        } else if error.is_io() {
            "JSON/IO"
        } else {
            "JSON/ERROR"
        };

        let mut app_error = AppError::new(code, error.to_string());
        let line = error.line();
        if line > 0 {
            app_error = app_error.with_context("line", line.to_string());
        }
        let column = error.column();
        if column > 0 {
            app_error = app_error.with_context("column", column.to_string());
        }
        app_error
    }
}

impl From<Base64Error> for AppError {
    fn from(error: Base64Error) -> Self {
        AppError::new("TOKEN/DECODE", format!("Invalid code format: {error}"))
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_NOT_FOUND", "Record not found"),
            SqlxError::ColumnNotFound(name) => {
                AppError::new("SQLX/COLUMN_NOT_FOUND", format!("Column not found: {name}"))
            }
            SqlxError::PoolTimedOut => AppError::new(
                "SQLX/POOL_TIMEOUT",
                "Timed out acquiring a database connection",
            ),
            SqlxError::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "Database pool is closed"),
            SqlxError::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            SqlxError::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("Sqlite/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new("SQLX/COLUMN_DECODE", source.to_string())
                    .with_context("column_index", index.to_string())
            }
            SqlxError::Decode(decode_err) => AppError::new("SQLX/DECODE", decode_err.to_string()),
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn builds_error_with_context_and_cause() {
        let error = AppError::new("TEST/CODE", "Something went wrong")
            .with_context("table", "supplies")
            .with_context("id", "s1")
            .with_cause(AppError::from("inner failure"));

        assert_eq!(error.code(), "TEST/CODE");
        assert_eq!(error.message(), "Something went wrong");
        assert_eq!(error.context().get("table"), Some(&"supplies".to_string()));
        assert_eq!(error.context().get("id"), Some(&"s1".to_string()));
        let cause = error.cause().expect("cause present");
        assert_eq!(cause.message(), "inner failure");
        assert_eq!(cause.code(), AppError::GENERIC_CODE);
    }

    #[test]
    fn converts_anyhow_error_chain_into_nested_causes() {
        let err = (|| -> anyhow::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
                .context("failed to write backup")
        })()
        .unwrap_err();

        let app_error = AppError::from(err);
        assert_eq!(app_error.code(), AppError::UNKNOWN_CODE);
        assert_eq!(app_error.message(), "failed to write backup");

        let cause = app_error.cause().expect("io cause present");
        assert!(cause.message().contains("disk full"));
    }

    #[test]
    fn converts_anyhow_preserves_existing_app_error_chain() {
        let inner = AppError::new("HOUSEHOLD/REQUIRED", "householdId is required")
            .with_cause(AppError::new("DB/FAIL", "db fail"));
        let err = AnyhowError::from(inner.clone()).context("outer failure");

        let converted = AppError::from(err);
        assert_eq!(converted.message(), "outer failure");
        assert_eq!(converted.cause().expect("inner cause present"), &inner);
    }

    #[test]
    fn serde_json_errors_capture_position() {
        let err: SerdeJsonError =
            serde_json::from_str::<serde_json::Value>("{\"foo\": }").expect_err("invalid json");
        let app_error = AppError::from(err);
        assert_eq!(app_error.code(), "JSON/SYNTAX");
        assert!(app_error.context().contains_key("line"));
        assert!(app_error.is_validation());
    }

    #[test]
    fn sqlx_row_not_found_is_not_found() {
        let app_error = AppError::from(SqlxError::RowNotFound);
        assert_eq!(app_error.code(), "SQLX/ROW_NOT_FOUND");
        assert!(app_error.is_not_found());
        assert!(!app_error.is_validation());
    }

    #[test]
    fn validation_helper_tags_field() {
        let error = AppError::validation("role", "role is required");
        assert_eq!(error.code(), "VALIDATION/ROLE");
        assert_eq!(error.context().get("field"), Some(&"role".to_string()));
        assert!(error.is_validation());
    }

    #[test]
    fn panic_payload_handles_common_shapes() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_payload(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_payload(boxed.as_ref()), "kaboom");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_payload(boxed.as_ref()), "unknown panic payload");
    }
}
