// src/geocode/mod.rs
//! Address → coordinate resolution.
//!
//! The enricher only sees the [`Geocoder`] trait; the production client is
//! built once at startup and passed in, and tests swap in deterministic stubs.

pub mod nominatim;

use std::time::Duration;

use async_trait::async_trait;

pub use nominatim::NominatimGeocoder;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Failures distinct from "no match". Not-found is `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding timed out after {0:?}")]
    Timeout(Duration),
    #[error("geocoding service error: {0}")]
    Service(String),
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Single lookup bounded by `timeout`. No retries.
    async fn lookup(&self, address: &str, timeout: Duration)
        -> Result<Option<GeoPoint>, GeocodeError>;

    fn name(&self) -> &'static str;
}
