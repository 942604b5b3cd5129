use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::db::open_sqlite_pool;
use crate::migrate::apply_migrations;
use crate::route_logging::RequestScope;
use crate::state::AppState;
use crate::util::dispatch_async_app_result;
use crate::{AppError, AppResult};

pub mod api;
pub mod changes;
pub mod households;

/// Run `f` inside the panic fence and log its outcome through `scope`.
pub(crate) async fn fenced<T, F, Fut>(
    scope: &RequestScope,
    f: F,
    details: impl FnOnce(&T) -> Value,
) -> AppResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let result = dispatch_async_app_result(f).await;
    scope.finish(result, details)
}

/// Unwrap a JSON body, turning extractor rejections into `JSON/INVALID_BODY`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::new("JSON/INVALID_BODY", rejection.body_text()))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/invite", post(api::invite))
        .route("/api/import", post(api::import))
        .route("/api/members", get(api::members))
        .route("/api/send-notification", post(api::send_notification))
        .route("/api/setup-database", post(api::setup_database))
        .route("/api/households/{id}/snapshot", get(households::snapshot))
        .route("/api/households/{id}/token", get(households::token))
        .route("/api/households/{id}/import", post(households::import))
        .route("/api/households/{id}/initialize", post(households::initialize))
        .route("/api/households/{id}/supplies", post(households::create_supply))
        .route(
            "/api/households/{id}/supplies/{sid}",
            patch(households::update_supply).delete(households::delete_supply),
        )
        .route("/api/households/{id}/categories", post(households::create_category))
        .route(
            "/api/households/{id}/categories/{cid}",
            patch(households::update_category).delete(households::delete_category),
        )
        .route(
            "/api/households/{id}/members/{mid}",
            delete(households::remove_member),
        )
        .route(
            "/api/households/{id}/notifications/{nid}/read",
            post(households::mark_read),
        )
        .route(
            "/api/households/{id}/notifications/{nid}/resolve",
            post(households::resolve_notification),
        )
        .route("/api/households/{id}/shopping-list", get(households::shopping_list))
        .route("/api/households/{id}/changes", get(changes::stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the database, apply migrations and serve until a shutdown signal.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    info!(target: "homestock", event = "server_starting", db = %config.db_path.display());
    let pool = open_sqlite_pool(&config.db_path).await?;
    let report = apply_migrations(&pool).await?;
    info!(
        target: "homestock",
        event = "migrations_checked",
        applied = report.applied.len(),
        skipped = report.skipped.len()
    );

    let bind = config.bind;
    let state = AppState::new(pool.clone(), config)?;
    let app = router(state);

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(target: "homestock", event = "server_listening", address = %bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;

    pool.close().await;
    info!(target: "homestock", event = "server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = ctrl_c().await {
            tracing::error!(target: "homestock", event = "signal_install_failed", error = %err);
            std::future::pending::<()>().await;
        }
        info!(target: "homestock", event = "shutdown_requested", signal = "ctrl_c");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!(target: "homestock", event = "shutdown_requested", signal = "sigterm");
            }
            Err(err) => {
                tracing::error!(target: "homestock", event = "signal_install_failed", error = %err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
