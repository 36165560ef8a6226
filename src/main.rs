//! Incident mapper service: binary entrypoint.
//! Boots the Axum HTTP server with the refresh trigger and the incident listing.

use incident_mapper::config::AppConfig;
use incident_mapper::metrics::Metrics;
use incident_mapper::{api, build_pipeline};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    incident_mapper::init_tracing();

    let cfg = AppConfig::load_default()?;
    let pipeline = build_pipeline(&cfg)?;

    let mut state = api::AppState::new(pipeline);
    match Metrics::init() {
        Ok(m) => state = state.with_metrics(m),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    Ok(api::router(state).into())
}
