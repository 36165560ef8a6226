//! One standalone geocoding pass over the configured store.
//! Usage: `cargo run --bin geocode-store [path/to/incidents.csv]`

use std::sync::Arc;

use anyhow::Context;
use incident_mapper::config::AppConfig;
use incident_mapper::enrich::{EnrichError, Enricher};
use incident_mapper::geocode::NominatimGeocoder;
use incident_mapper::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    incident_mapper::init_tracing();

    let cfg = AppConfig::load_default()?;
    let store_path = std::env::args_os()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| cfg.store_path.clone());

    let geocoder = NominatimGeocoder::new(&cfg.geocoder_endpoint, &cfg.user_agent)
        .context("building geocoder")?;
    let enricher = Enricher::new(Arc::new(geocoder), cfg.enrich_options());
    let store = Store::new(&store_path);

    match enricher.enrich(&store).await {
        Ok(report) => {
            tracing::info!(
                path = %store_path.display(),
                processed = report.processed,
                updated = report.updated,
                "geocode-store done"
            );
            Ok(())
        }
        Err(EnrichError::Persist {
            processed,
            updated,
            source,
        }) => Err(anyhow::Error::new(source).context(format!(
            "geocoded {updated} of {processed} records but the store was not rewritten"
        ))),
        Err(e) => Err(e.into()),
    }
}
