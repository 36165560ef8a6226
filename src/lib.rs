// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod dedup;
pub mod enrich;
pub mod geocode;
pub mod incident;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::incident::{Incident, INCIDENT_FIELDS};
pub use crate::pipeline::{Pipeline, PipelineError, RunSummary};
pub use crate::store::{Store, StoreError};

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::geocode::NominatimGeocoder;
use crate::ingest::fetch::HttpFetcher;

/// Installs the global tracing subscriber.
///
/// Filter comes from `RUST_LOG` (default `incident_mapper=info,warn`);
/// `LOG_FORMAT=json` switches to JSON lines. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("incident_mapper=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wires the production pipeline (HTTP feed fetcher + Nominatim) from config.
pub fn build_pipeline(cfg: &AppConfig) -> anyhow::Result<Pipeline> {
    let fetcher = HttpFetcher::new(&cfg.user_agent, cfg.fetch_timeout())?;
    let geocoder = NominatimGeocoder::new(&cfg.geocoder_endpoint, &cfg.user_agent)?;
    tracing::info!(
        feed = %cfg.feed_url,
        store = %cfg.store_path.display(),
        geocoder = %cfg.geocoder_endpoint,
        "pipeline configured"
    );
    Ok(Pipeline::new(
        cfg.feed_url.clone(),
        Arc::new(fetcher),
        Arc::new(geocoder),
        Store::new(cfg.store_path.clone()),
        cfg.enrich_options(),
    ))
}
