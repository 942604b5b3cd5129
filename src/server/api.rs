//! Household-agnostic endpoints kept at the paths the web client calls.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{fenced, json_body};
use crate::import::{import_groups, parse_groups};
use crate::members::{self, InviteRequest};
use crate::migrate::apply_migrations;
use crate::notify::{run_notification_job, NotifyOptions};
use crate::route_logging::RequestScope;
use crate::state::AppState;
use crate::util::require_household;
use crate::{AppError, AppResult};

/// POST /api/invite
pub async fn invite(
    State(state): State<AppState>,
    payload: Result<Json<InviteRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload)?;
    let scope = RequestScope::new("invite", body.household_id.as_deref());
    let member = fenced(
        &scope,
        || async move { members::invite(&state.pool, &state.feed, body).await },
        |m| json!({ "member_id": m.id, "role": m.role }),
    )
    .await?;
    Ok(Json(json!({ "invite": member })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportBody {
    #[serde(default)]
    pub household_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// POST /api/import
pub async fn import(
    State(state): State<AppState>,
    payload: Result<Json<BulkImportBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload)?;
    let scope = RequestScope::new("bulk_import", body.household_id.as_deref());
    let summary = fenced(
        &scope,
        || async move {
            let household_id = require_household(body.household_id.as_deref().unwrap_or_default())?;
            let data = body.data.unwrap_or(Value::Null);
            let groups = parse_groups(&data)?;
            import_groups(&state.pool, &state.feed, household_id, &groups).await
        },
        |s| json!({ "categories": s.categories, "supplies": s.supplies }),
    )
    .await?;
    Ok(Json(json!({ "ok": true, "inserted": summary })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdQuery {
    #[serde(default)]
    pub household_id: Option<String>,
}

/// GET /api/members?householdId=
pub async fn members(
    State(state): State<AppState>,
    Query(query): Query<HouseholdQuery>,
) -> AppResult<Json<Value>> {
    let scope = RequestScope::new("members", query.household_id.as_deref());
    let members = fenced(
        &scope,
        || async move {
            let household_id = query.household_id.unwrap_or_default();
            members::list(&state.pool, &household_id).await
        },
        |m| json!({ "count": m.len() }),
    )
    .await?;
    Ok(Json(json!({ "ok": true, "members": members })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationBody {
    #[serde(default)]
    pub household_id: Option<String>,
    #[serde(default)]
    pub send_message: bool,
}

/// POST /api/send-notification
pub async fn send_notification(
    State(state): State<AppState>,
    payload: Result<Json<SendNotificationBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let body = json_body(payload)?;
    let scope = RequestScope::new("send_notification", body.household_id.as_deref());
    let outcome = fenced(
        &scope,
        || async move {
            let household_id = body.household_id.unwrap_or_default();
            let options = NotifyOptions {
                send_message: body.send_message,
            };
            run_notification_job(
                &state.pool,
                &state.feed,
                state.messenger.as_ref(),
                &household_id,
                options,
            )
            .await
        },
        |o| json!({ "created": o.created() }),
    )
    .await?;
    let mut response = json!({ "ok": true, "message": outcome.message() });
    if outcome.created() > 0 {
        response["notificationsCreated"] = json!(outcome.created());
    }
    Ok(Json(response))
}

/// POST /api/setup-database
///
/// Applies the migrations compiled into the binary; the request body is
/// ignored.
pub async fn setup_database(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let scope = RequestScope::new("setup_database", None);
    fenced(
        &scope,
        || async move {
            apply_migrations(&state.pool).await.map_err(|err| {
                AppError::new("DB/SETUP_FAILED", "Failed to setup database")
                    .with_cause(AppError::from(err))
            })
        },
        |report| json!({ "applied": report.applied, "skipped": report.skipped.len() }),
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}
