use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::history::EventHistory;
use crate::ingest::types::StatusEvent;

const DEFAULT_EVENTS_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub history: Arc<EventHistory>,
}

impl AppState {
    pub fn new(history: Arc<EventHistory>) -> Self {
        Self { history }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/events", get(events))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Status monitor is running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(serde::Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

#[derive(serde::Serialize)]
struct EventsOut {
    events: Vec<StatusEvent>,
}

async fn events(State(state): State<AppState>, Query(q): Query<EventsQuery>) -> Json<EventsOut> {
    let n = q.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    Json(EventsOut {
        events: state.history.snapshot_last_n(n),
    })
}
