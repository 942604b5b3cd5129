use std::collections::HashMap;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::AppError;

fn context_to_json(context: &HashMap<String, String>) -> Option<Value> {
    if context.is_empty() {
        None
    } else {
        let mut map = Map::with_capacity(context.len());
        for (key, value) in context {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        Some(Value::Object(map))
    }
}

fn wrap_details(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        json!({ "value": value })
    }
}

fn error_details(err: &AppError) -> Value {
    let mut map = Map::new();
    map.insert("code".into(), Value::String(err.code().to_string()));
    map.insert("message".into(), Value::String(err.message().to_string()));
    if let Some(context) = context_to_json(err.context()) {
        map.insert("context".into(), context);
    }
    Value::Object(map)
}

/// Structured enter/success/fail logging around one API operation.
pub struct RequestScope {
    route: &'static str,
    household_id: Option<String>,
    start: Instant,
}

impl RequestScope {
    pub fn new(route: &'static str, household_id: Option<&str>) -> Self {
        let scope = Self {
            route,
            household_id: household_id.map(str::to_owned),
            start: Instant::now(),
        };
        debug!(
            target: "homestock",
            area = "api",
            route = scope.route,
            household_id = scope.household_id.as_deref(),
            details = %json!({ "stage": "enter" })
        );
        scope
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn success(&self, details: Value) {
        info!(
            target: "homestock",
            area = "api",
            route = self.route,
            household_id = self.household_id.as_deref(),
            duration_ms = self.elapsed_ms(),
            details = %wrap_details(details)
        );
    }

    pub fn warn(&self, details: Value) {
        warn!(
            target: "homestock",
            area = "api",
            route = self.route,
            household_id = self.household_id.as_deref(),
            duration_ms = self.elapsed_ms(),
            details = %wrap_details(details)
        );
    }

    /// Client mistakes log at warn, everything else at error.
    pub fn fail(&self, err: &AppError) {
        if err.is_validation() || err.is_not_found() {
            self.warn(error_details(err));
            return;
        }
        error!(
            target: "homestock",
            area = "api",
            route = self.route,
            household_id = self.household_id.as_deref(),
            duration_ms = self.elapsed_ms(),
            details = %error_details(err)
        );
    }

    /// Log the outcome of `result` and hand it back unchanged.
    pub fn finish<T>(&self, result: Result<T, AppError>, details: impl FnOnce(&T) -> Value) -> Result<T, AppError> {
        match &result {
            Ok(value) => self.success(details(value)),
            Err(err) => self.fail(err),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_scalar_details() {
        assert_eq!(wrap_details(json!(3)), json!({ "value": 3 }));
        assert_eq!(wrap_details(json!({ "a": 1 })), json!({ "a": 1 }));
    }

    #[test]
    fn error_details_include_context() {
        let err = AppError::new("IMPORT/STEP_FAILED", "boom").with_context("step", "supplies");
        let details = error_details(&err);
        assert_eq!(details["code"], "IMPORT/STEP_FAILED");
        assert_eq!(details["context"]["step"], "supplies");
    }

    #[test]
    fn finish_returns_result_unchanged() {
        let scope = RequestScope::new("test", Some("h1"));
        let ok: Result<u8, AppError> = scope.finish(Ok(4), |v| json!({ "value": v }));
        assert_eq!(ok.unwrap(), 4);
        let err: Result<u8, AppError> =
            scope.finish(Err(AppError::new("X/NOT_FOUND", "gone")), |_| json!({}));
        assert_eq!(err.unwrap_err().code(), "X/NOT_FOUND");
    }
}
