//! Routes scoped to one household: `/api/households/{id}/...`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{fenced, json_body};
use crate::categories::{self, Category, CategoryPatch, NewCategory};
use crate::export::{build_document, decode_token, encode_token, ExportDocument, ImportDocument};
use crate::household::{initialize_household, SeedOutcome};
use crate::import::{apply_import, ImportMode, ImportReport};
use crate::members;
use crate::notifications;
use crate::notify::resolve_notification as resolve_by_name;
use crate::route_logging::RequestScope;
use crate::shopping_list::ShoppingList;
use crate::state::AppState;
use crate::supplies::{self, NewSupply, Supply, SupplyPatch, SupplyStatus};
use crate::{AppError, AppResult};

/// GET /api/households/{id}/snapshot
pub async fn snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ExportDocument>> {
    let scope = RequestScope::new("snapshot", Some(&id));
    let doc = fenced(
        &scope,
        || async move { build_document(&state.pool, &id).await },
        |d| json!({ "supplies": d.supplies.len(), "categories": d.categories.len() }),
    )
    .await?;
    Ok(Json(doc))
}

/// GET /api/households/{id}/token
pub async fn token(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let scope = RequestScope::new("token", Some(&id));
    let token = fenced(
        &scope,
        || async move { encode_token(&build_document(&state.pool, &id).await?) },
        |t| json!({ "length": t.len() }),
    )
    .await?;
    Ok(Json(json!({ "token": token })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBody {
    #[serde(default)]
    pub mode: ImportMode,
    #[serde(default)]
    pub document: Option<ImportDocument>,
    #[serde(default)]
    pub token: Option<String>,
}

impl ImportBody {
    fn into_document(self) -> AppResult<(ImportDocument, ImportMode)> {
        let doc = match (self.document, self.token) {
            (Some(doc), _) => doc,
            (None, Some(token)) => decode_token(&token)?,
            (None, None) => {
                return Err(AppError::validation("document", "Provide a document or a token"))
            }
        };
        Ok((doc, self.mode))
    }
}

/// POST /api/households/{id}/import
pub async fn import(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ImportBody>, JsonRejection>,
) -> AppResult<Json<ImportReport>> {
    let scope = RequestScope::new("import", Some(&id));
    let report = fenced(
        &scope,
        || async move {
            let (doc, mode) = json_body(payload)?.into_document()?;
            apply_import(&state.pool, &state.feed, &id, &doc, mode).await
        },
        |r| json!({ "mode": r.mode, "supplies": r.supplies.upserted, "pruned": r.supplies.pruned }),
    )
    .await?;
    Ok(Json(report))
}

/// POST /api/households/{id}/initialize
pub async fn initialize(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SeedOutcome>> {
    let scope = RequestScope::new("initialize", Some(&id));
    let outcome = fenced(
        &scope,
        || async move { initialize_household(&state.pool, &state.feed, &id, &state.dataset).await },
        |o| json!(o),
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/households/{id}/supplies
pub async fn create_supply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewSupply>, JsonRejection>,
) -> AppResult<Json<Supply>> {
    let scope = RequestScope::new("create_supply", Some(&id));
    let supply = fenced(
        &scope,
        || async move { supplies::insert(&state.pool, &state.feed, &id, json_body(payload)?).await },
        |s| json!({ "supply_id": s.id }),
    )
    .await?;
    Ok(Json(supply))
}

/// PATCH /api/households/{id}/supplies/{sid}
pub async fn update_supply(
    State(state): State<AppState>,
    Path((id, supply_id)): Path<(String, String)>,
    payload: Result<Json<SupplyPatch>, JsonRejection>,
) -> AppResult<Json<Supply>> {
    let scope = RequestScope::new("update_supply", Some(&id));
    let supply = fenced(
        &scope,
        || async move {
            supplies::update(&state.pool, &state.feed, &id, &supply_id, json_body(payload)?).await
        },
        |s| json!({ "supply_id": s.id, "status": s.status }),
    )
    .await?;
    Ok(Json(supply))
}

/// DELETE /api/households/{id}/supplies/{sid}
pub async fn delete_supply(
    State(state): State<AppState>,
    Path((id, supply_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let scope = RequestScope::new("delete_supply", Some(&id));
    let details = json!({ "supply_id": supply_id });
    fenced(
        &scope,
        || async move { supplies::delete(&state.pool, &state.feed, &id, &supply_id).await },
        |_| details,
    )
    .await?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /api/households/{id}/categories
pub async fn create_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewCategory>, JsonRejection>,
) -> AppResult<Json<Category>> {
    let scope = RequestScope::new("create_category", Some(&id));
    let category = fenced(
        &scope,
        || async move { categories::insert(&state.pool, &state.feed, &id, json_body(payload)?).await },
        |c| json!({ "category_id": c.id }),
    )
    .await?;
    Ok(Json(category))
}

/// PATCH /api/households/{id}/categories/{cid}
pub async fn update_category(
    State(state): State<AppState>,
    Path((id, category_id)): Path<(String, String)>,
    payload: Result<Json<CategoryPatch>, JsonRejection>,
) -> AppResult<Json<Category>> {
    let scope = RequestScope::new("update_category", Some(&id));
    let category = fenced(
        &scope,
        || async move {
            categories::update(&state.pool, &state.feed, &id, &category_id, json_body(payload)?).await
        },
        |c| json!({ "category_id": c.id }),
    )
    .await?;
    Ok(Json(category))
}

/// DELETE /api/households/{id}/categories/{cid}
///
/// Removes the category's supplies too.
pub async fn delete_category(
    State(state): State<AppState>,
    Path((id, category_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let scope = RequestScope::new("delete_category", Some(&id));
    let removed = fenced(
        &scope,
        || async move { categories::delete(&state.pool, &state.feed, &id, &category_id).await },
        |removed| json!({ "supplies_removed": removed.len() }),
    )
    .await?;
    Ok(Json(json!({ "ok": true, "removedSupplies": removed })))
}

/// DELETE /api/households/{id}/members/{mid}
pub async fn remove_member(
    State(state): State<AppState>,
    Path((id, member_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let scope = RequestScope::new("remove_member", Some(&id));
    let details = json!({ "member_id": member_id });
    fenced(
        &scope,
        || async move { members::remove(&state.pool, &state.feed, &id, &member_id).await },
        |_| details,
    )
    .await?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /api/households/{id}/notifications/{nid}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path((id, notification_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let scope = RequestScope::new("mark_read", Some(&id));
    fenced(
        &scope,
        || async move {
            notifications::mark_read(&state.pool, &state.feed, &id, &notification_id).await
        },
        |n| json!({ "notification_id": n.id }),
    )
    .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub status: SupplyStatus,
}

/// POST /api/households/{id}/notifications/{nid}/resolve
pub async fn resolve_notification(
    State(state): State<AppState>,
    Path((id, notification_id)): Path<(String, String)>,
    payload: Result<Json<ResolveBody>, JsonRejection>,
) -> AppResult<Json<Supply>> {
    let scope = RequestScope::new("resolve_notification", Some(&id));
    let supply = fenced(
        &scope,
        || async move {
            let body = json_body(payload)?;
            resolve_by_name(&state.pool, &state.feed, &id, &notification_id, body.status).await
        },
        |s| json!({ "supply_id": s.id, "status": s.status }),
    )
    .await?;
    Ok(Json(supply))
}

/// GET /api/households/{id}/shopping-list
pub async fn shopping_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let scope = RequestScope::new("shopping_list", Some(&id));
    let list = fenced(
        &scope,
        || async move {
            let categories = categories::list(&state.pool, &id).await?;
            let supplies = supplies::list(&state.pool, &id).await?;
            ShoppingList::from_collections(&categories, &supplies)
        },
        |l| json!({ "items": l.item_count() }),
    )
    .await?;
    let disposition = format!("attachment; filename=\"{}\"", list.file_name());
    Ok((
        [
            (CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        list.to_html(),
    ))
}
