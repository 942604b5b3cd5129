use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::Future;
use futures::FutureExt;

use crate::{error::panic_payload, id::new_uuid_v7, AppError, AppResult};

fn app_error_from_panic(payload: Box<dyn Any + Send>) -> AppError {
    let message = panic_payload(payload.as_ref());
    let error = AppError::new(AppError::PANIC_CODE, message).with_context("crash_id", new_uuid_v7());
    error.log_with_event("panic_caught");
    error
}

#[allow(clippy::result_large_err)]
pub fn dispatch_with_fence<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => Ok(result),
        Err(payload) => Err(app_error_from_panic(payload)),
    }
}

#[allow(clippy::result_large_err)]
pub async fn dispatch_async_with_fence<F, Fut, T>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let fut = dispatch_with_fence(|| AssertUnwindSafe(f()).catch_unwind())?;
    match fut.await {
        Ok(value) => Ok(value),
        Err(payload) => Err(app_error_from_panic(payload)),
    }
}

#[allow(clippy::result_large_err)]
pub async fn dispatch_async_app_result<F, Fut, T>(f: F) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    dispatch_async_with_fence(f).await?
}

/// Trimmed, non-empty household id or `HOUSEHOLD/REQUIRED`.
pub fn require_household(household_id: &str) -> AppResult<&str> {
    let trimmed = household_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::new(
            "HOUSEHOLD/REQUIRED",
            "householdId is required",
        ));
    }
    Ok(trimmed)
}
