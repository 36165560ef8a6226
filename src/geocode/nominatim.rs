// src/geocode/nominatim.rs
//! Nominatim (OpenStreetMap) search client.
//!
//! Usage policy: a descriptive user agent and at most one request per second.
//! The rate limit is enforced by the enricher, not here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::{GeoPoint, GeocodeError, Geocoder};

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "uw_incident_mapper/1.0";

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    client: Client,
    search_url: Url,
}

impl NominatimGeocoder {
    /// `endpoint` is the service root, e.g. [`DEFAULT_ENDPOINT`].
    pub fn new(endpoint: &str, user_agent: &str) -> anyhow::Result<Self> {
        let base = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("invalid geocoder endpoint {endpoint:?}: {e}"))?;
        let search_url = Url::parse(&format!("{}/search", base.as_str().trim_end_matches('/')))?;
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(4))
            .build()?;
        Ok(Self { client, search_url })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn lookup(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Option<GeoPoint>, GeocodeError> {
        let resp = self
            .client
            .get(self.search_url.clone())
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(map_status_error(status, timeout));
        }

        let hits: Vec<SearchHit> = resp
            .json()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        hits.into_iter().next().map(parse_hit).transpose()
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

fn parse_hit(hit: SearchHit) -> Result<GeoPoint, GeocodeError> {
    let lat: f64 = hit
        .lat
        .trim()
        .parse()
        .map_err(|_| GeocodeError::Service(format!("unparseable latitude {:?}", hit.lat)))?;
    let lon: f64 = hit
        .lon
        .trim()
        .parse()
        .map_err(|_| GeocodeError::Service(format!("unparseable longitude {:?}", hit.lon)))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(GeocodeError::Service(format!(
            "coordinates out of range: {lat}, {lon}"
        )));
    }
    Ok(GeoPoint { lat, lon })
}

fn map_transport_error(error: reqwest::Error, timeout: Duration) -> GeocodeError {
    if error.is_timeout() {
        GeocodeError::Timeout(timeout)
    } else {
        GeocodeError::Service(error.to_string())
    }
}

fn map_status_error(status: StatusCode, timeout: Duration) -> GeocodeError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GeocodeError::Timeout(timeout),
        _ => GeocodeError::Service(format!("status {}", status.as_u16())),
    }
}
