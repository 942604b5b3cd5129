use std::net::SocketAddr;

use anyhow::Result;
use homestock_lib::server::router;
use homestock_lib::state::AppState;
use homestock_lib::supplies::{self, SupplyStatus};
use homestock_lib::ErrorBody;
use reqwest::StatusCode;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
#[path = "util.rs"]
mod util;

struct TestServer {
    addr: SocketAddr,
    pool: SqlitePool,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Result<Self> {
        let pool = util::temp_pool().await;
        let state = AppState::new(pool.clone(), util::test_config())?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });
        Ok(Self {
            addr,
            pool,
            client: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<reqwest::Response> {
        Ok(self.client.post(self.url(path)).json(&body).send().await?)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).send().await?)
    }
}

#[tokio::test]
async fn invite_requires_household_and_role() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server.post("/api/invite", json!({ "role": "husband" })).await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = res.json().await?;
    assert_eq!(body.error, "householdId and role are required");

    let res = server
        .post(
            "/api/invite",
            json!({ "householdId": "h1", "role": "husband", "email": "Omar@Example.com" }),
        )
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["invite"]["email"], "omar@example.com");
    assert_eq!(body["invite"]["invite_status"], "pending");

    let res = server.get("/api/members?householdId=h1").await?;
    let body: Value = res.json().await?;
    assert_eq!(body["ok"], true);
    assert_eq!(body["members"].as_array().map(Vec::len), Some(1));

    let member_id = body["members"][0]["id"].as_str().unwrap_or_default().to_string();
    let path = format!("/api/households/h1/members/{member_id}");
    let res = server.client.delete(server.url(&path)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let res = server.client.delete(server.url(&path)).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server.get("/api/members?householdId=h1").await?;
    let body: Value = res.json().await?;
    assert_eq!(body["members"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn members_without_household_is_rejected() -> Result<()> {
    let server = TestServer::start().await?;
    let res = server.get("/api/members").await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = res.json().await?;
    assert_eq!(body.code, "HOUSEHOLD/REQUIRED");
    Ok(())
}

#[tokio::test]
async fn bulk_import_groups_items_by_category() -> Result<()> {
    let server = TestServer::start().await?;
    let res = server
        .post(
            "/api/import",
            json!({
                "householdId": "h1",
                "data": [
                    { "category": "Cleaning Tools", "items": [
                        { "name": "Bleach", "status": "low" },
                        { "name": "Sponges" }
                    ]},
                    { "items": [{ "name": "Mystery" }] }
                ]
            }),
        )
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["ok"], true);
    assert_eq!(body["inserted"], json!({ "categories": 2, "supplies": 3 }));

    let low = supplies::list_by_status(&server.pool, "h1", &[SupplyStatus::Low]).await?;
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].category, "cleaning-tools");

    let res = server
        .post("/api/import", json!({ "householdId": "h1", "data": { "not": "a list" } }))
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = res.json().await?;
    assert_eq!(body.code, "IMPORT/INVALID_SHAPE");
    Ok(())
}

#[tokio::test]
async fn send_notification_reports_created_count() -> Result<()> {
    let server = TestServer::start().await?;
    let res = server.post("/api/send-notification", json!({ "householdId": "h1" })).await?;
    let body: Value = res.json().await?;
    assert_eq!(body, json!({ "ok": true, "message": "No items to notify" }));

    server
        .post(
            "/api/import",
            json!({ "householdId": "h1", "data": [
                { "category": "Pantry", "items": [{ "name": "Rice", "status": "out" }] }
            ]}),
        )
        .await?;
    let res = server.post("/api/send-notification", json!({ "householdId": "h1" })).await?;
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Notifications created");
    assert_eq!(body["notificationsCreated"], 1);
    Ok(())
}

#[tokio::test]
async fn setup_database_is_idempotent() -> Result<()> {
    let server = TestServer::start().await?;
    for _ in 0..2 {
        let res = server.post("/api/setup-database", json!({})).await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await?;
        assert_eq!(body, json!({ "success": true }));
    }
    Ok(())
}

#[tokio::test]
async fn household_lifecycle_over_http() -> Result<()> {
    let server = TestServer::start().await?;

    let res = server.post("/api/households/h1/initialize", json!({})).await?;
    let seed: Value = res.json().await?;
    assert_eq!(seed["outcome"], "seeded");
    assert_eq!(seed["categories"], 4);

    let res = server.get("/api/households/h1/shopping-list").await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = res.json().await?;
    assert_eq!(body.error, "No items need to be bought!");

    let res = server
        .client
        .patch(server.url("/api/households/h1/supplies/spices-cumin"))
        .json(&json!({ "status": "out" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.get("/api/households/h1/shopping-list").await?;
    assert_eq!(res.status(), StatusCode::OK);
    let disposition = res
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("shopping-list-"));
    let html = res.text().await?;
    assert!(html.contains("Cumin"));
    assert!(html.contains("Out of Stock"));

    let res = server.get("/api/households/h1/token").await?;
    let token: Value = res.json().await?;
    let token = token["token"].as_str().unwrap_or_default().to_string();
    assert!(!token.is_empty());

    let res = server
        .post("/api/households/h2/import", json!({ "mode": "replace", "token": token }))
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await?;
    assert_eq!(report["mode"], "replace");
    assert_eq!(report["categories"]["upserted"], 4);

    let cumin = supplies::get(&server.pool, "h2", "spices-cumin").await?;
    assert_eq!(cumin.status, SupplyStatus::Out);
    Ok(())
}

#[tokio::test]
async fn category_delete_reports_removed_supplies() -> Result<()> {
    let server = TestServer::start().await?;
    server.post("/api/households/h1/initialize", json!({})).await?;

    let res = server
        .client
        .delete(server.url("/api/households/h1/categories/spices"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["ok"], true);
    assert!(body["removedSupplies"]
        .as_array()
        .is_some_and(|ids| ids.iter().any(|id| id == "spices-cumin")));

    let res = server
        .client
        .delete(server.url("/api/households/h1/categories/spices"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() -> Result<()> {
    let server = TestServer::start().await?;
    let res = server
        .client
        .post(server.url("/api/households/h1/supplies"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{ nope")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = res.json().await?;
    assert_eq!(body.code, "JSON/INVALID_BODY");

    let res = server
        .post("/api/households/h1/import", json!({ "token": "%%%not-base64" }))
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn change_stream_delivers_writes() -> Result<()> {
    let server = TestServer::start().await?;
    let mut stream = server.get("/api/households/h1/changes").await?;
    assert_eq!(stream.status(), StatusCode::OK);

    server
        .post(
            "/api/households/h1/categories",
            json!({ "id": "garage", "name": "Garage" }),
        )
        .await?;

    let mut received = String::new();
    let deadline = std::time::Duration::from_secs(5);
    while !received.contains("garage") {
        match tokio::time::timeout(deadline, stream.chunk()).await {
            Ok(Ok(Some(chunk))) => received.push_str(&String::from_utf8_lossy(&chunk)),
            other => panic!("stream ended early: {other:?}, got {received:?}"),
        }
    }
    assert!(received.contains("event: change"));
    assert!(received.contains("\"inserted\""));
    Ok(())
}
