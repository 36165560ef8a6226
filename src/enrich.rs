// src/enrich.rs
//! Geocoding pass over the store.
//!
//! Calls are strictly sequential with a minimum spacing between them; the
//! external service's usage policy caps throughput, so there is no
//! concurrency here. Each candidate gets exactly one attempt per run.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::time::Instant;

use crate::geocode::{GeoPoint, GeocodeError, Geocoder};
use crate::store::{Store, StoreError};

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("geocode_requests_total", "Geocoding lookups issued.");
        describe_counter!(
            "geocode_failures_total",
            "Lookups that did not yield coordinates, by kind."
        );
        describe_counter!("geocode_updated_total", "Records that received coordinates.");
    });
}

#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    /// Upper bound for a single lookup.
    pub timeout: Duration,
    /// Minimum pause between the end of one lookup and the start of the next.
    pub min_interval: Duration,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
    /// Every record examined, geocoded or not.
    pub processed: usize,
    /// Records that received coordinates in this pass.
    pub updated: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("could not load store for geocoding: {0}")]
    Load(#[source] StoreError),
    /// The geocoding work happened but the rewrite failed; the store on disk is
    /// the pre-run version.
    #[error("geocoded {updated} of {processed} records but could not persist them: {source}")]
    Persist {
        processed: usize,
        updated: usize,
        #[source]
        source: StoreError,
    },
}

pub struct Enricher {
    geocoder: Arc<dyn Geocoder>,
    opts: EnrichOptions,
}

impl Enricher {
    pub fn new(geocoder: Arc<dyn Geocoder>, opts: EnrichOptions) -> Self {
        Self { geocoder, opts }
    }

    pub async fn enrich(&self, store: &Store) -> Result<EnrichReport, EnrichError> {
        ensure_metrics_described();

        let loaded = store
            .blocking(|s| s.load())
            .await
            .map_err(EnrichError::Load)?;
        let Some(mut rows) = loaded else {
            tracing::warn!(target: "enrich", path = %store.path().display(), "store missing or empty; nothing to geocode");
            return Ok(EnrichReport::default());
        };

        let mut report = EnrichReport::default();
        let mut last_finished: Option<Instant> = None;

        for row in rows.iter_mut() {
            report.processed += 1;
            if !row.needs_geocoding() {
                continue;
            }
            let address = row.address_string.trim().to_string();

            if let Some(prev) = last_finished {
                let since = prev.elapsed();
                if since < self.opts.min_interval {
                    tokio::time::sleep(self.opts.min_interval - since).await;
                }
            }

            counter!("geocode_requests_total").increment(1);
            let outcome = self.lookup(&address).await;
            last_finished = Some(Instant::now());

            match outcome {
                Ok(Some(p)) => {
                    row.set_coordinates(p.lat, p.lon);
                    report.updated += 1;
                    counter!("geocode_updated_total").increment(1);
                    tracing::info!(target: "enrich", %address, lat = p.lat, lon = p.lon, "geocoded");
                }
                Ok(None) => {
                    counter!("geocode_failures_total", "kind" => "not_found").increment(1);
                    tracing::warn!(target: "enrich", %address, "address not found; leaving coordinates empty");
                }
                Err(e) => {
                    let kind = match e {
                        GeocodeError::Timeout(_) => "timeout",
                        GeocodeError::Service(_) => "service",
                    };
                    counter!("geocode_failures_total", "kind" => kind).increment(1);
                    tracing::warn!(target: "enrich", %address, error = %e, "geocoding failed; leaving coordinates empty");
                }
            }
        }

        if let Err(source) = store.blocking(move |s| s.rewrite_all(&rows)).await {
            tracing::error!(
                target: "enrich",
                error = %source,
                processed = report.processed,
                updated = report.updated,
                "could not persist geocoded store; original left untouched"
            );
            return Err(EnrichError::Persist {
                processed: report.processed,
                updated: report.updated,
                source,
            });
        }

        tracing::info!(
            target: "enrich",
            processed = report.processed,
            updated = report.updated,
            geocoder = self.geocoder.name(),
            "geocoding pass complete"
        );
        Ok(report)
    }

    async fn lookup(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let t = self.opts.timeout;
        match tokio::time::timeout(t, self.geocoder.lookup(address, t)).await {
            Ok(res) => res,
            Err(_) => Err(GeocodeError::Timeout(t)),
        }
    }
}
