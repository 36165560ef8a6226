use std::sync::Arc;

use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::incident::Incident;
use crate::metrics::Metrics;
use crate::pipeline::{Pipeline, RunSummary};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    // One refresh at a time: the store has a single writer.
    run_lock: Arc<Mutex<()>>,
    metrics: Option<Metrics>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            run_lock: Arc::new(Mutex::new(())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

type ApiError = (StatusCode, Json<Value>);

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.clone();

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/incidents", get(list_incidents))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state);

    match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    }
}

async fn list_incidents(State(state): State<AppState>) -> Result<Json<Vec<Incident>>, ApiError> {
    let store = state.pipeline.store();
    if !store.exists() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no incident data at {}", store.path().display()) })),
        ));
    }

    match store.blocking(|s| s.load()).await {
        Ok(rows) => Ok(Json(rows.unwrap_or_default())),
        Err(e) => {
            tracing::error!(target: "api", error = %e, "could not read store");
            Err(internal(e.to_string()))
        }
    }
}

async fn refresh(State(state): State<AppState>) -> Result<Json<RunSummary>, ApiError> {
    let Ok(_guard) = state.run_lock.try_lock() else {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "a refresh is already running" })),
        ));
    };

    match state.pipeline.run().await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            tracing::error!(target: "api", error = %e, "refresh failed");
            let partial = e.partial_summary();
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": e.to_string(),
                    "appended": partial.appended,
                    "geocoded_processed": partial.geocoded_processed,
                    "geocoded_updated": partial.geocoded_updated,
                })),
            ))
        }
    }
}

fn internal(msg: String) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": msg })))
}
