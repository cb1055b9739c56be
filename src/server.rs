use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::model::{Entry, NewEntry, PageResult, Stats};
use crate::query::{parse_params, run_query};
use crate::stats::SharedStats;
use crate::store::CatalogStore;
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CatalogStore>,
    pub stats: Arc<SharedStats>,
}

impl AppState {
    /// Wires the stats cache into the store's write path.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        let stats = Arc::new(SharedStats::default());
        let store = CatalogStore::open(data_path).with_observer(stats.clone());
        Self {
            store: Arc::new(store),
            stats,
        }
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/:id", get(get_item))
        .route("/stats", get(get_stats))
}

/// Routes are served both at the root and under `/api`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .with_state(state)
}

async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PageResult>, ApiError> {
    let query = parse_params(&params);
    let entries = state.store.read_all()?;
    let page = run_query(&entries, &query);
    info!(
        route = "/items",
        page = page.page,
        limit = page.limit,
        total_results = page.total_results,
        "listed items"
    );
    Ok(Json(page))
}

async fn get_item(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Entry>, ApiError> {
    let id = raw_id.trim().parse::<u64>().map_err(|_| ApiError::NotFound)?;
    match state.store.find(id)? {
        Some(entry) => Ok(Json(entry)),
        None => {
            info!(route = "/items/:id", id, "item not found");
            Err(ApiError::NotFound)
        }
    }
}

async fn create_item(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Entry>), ApiError> {
    let Json(body) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let new = parse_new_entry(&body)?;
    let entry = state.store.append(new)?;
    info!(route = "/items", id = entry.id, "created item");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    state
        .stats
        .get(&state.store)
        .map(Json)
        .map_err(ApiError::StatsUnavailable)
}

/// Presence checks only: a non-empty string `name` and a numeric `price`.
pub fn parse_new_entry(body: &Value) -> Result<NewEntry, ApiError> {
    let missing = || ApiError::Validation("Name and price are required.".to_string());
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(missing)?;
    let price = body.get("price").and_then(Value::as_f64).ok_or_else(missing)?;
    let category = body
        .get("category")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(NewEntry {
        name: name.to_string(),
        price,
        category,
    })
}

/// Binds, primes the stats cache, and serves until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let state = AppState::new(&config.data_path);
    state.store.ensure_exists()?;
    if let Err(err) = state.stats.get(&state.store) {
        warn!(error = %format!("{err:#}"), "initial stats calculation failed");
    }

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(
        addr = %listener.local_addr()?,
        data = %config.data_path.display(),
        "catalog server listening"
    );
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
