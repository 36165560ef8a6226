// src/incident.rs
//! The incident record shared by the feed parser, the store and the enricher.

use serde::{Deserialize, Serialize};

/// Column order of the store file. Downstream consumers (the map UI, ad-hoc
/// spreadsheets) read columns by name and position, so this never changes.
pub const INCIDENT_FIELDS: [&str; 9] = [
    "id",
    "title",
    "post_date",
    "incident_time_approx",
    "address_string",
    "latitude",
    "longitude",
    "summary_text",
    "source_url",
];

/// One structured record derived from a feed item.
///
/// Field declaration order matches [`INCIDENT_FIELDS`]; the csv serializer
/// writes columns in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Reserved for a stable identifier; the pipeline leaves it empty.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Raw `pubDate` of the feed item.
    #[serde(default)]
    pub post_date: String,
    /// Reserved; not derived by the current extraction.
    #[serde(default)]
    pub incident_time_approx: String,
    #[serde(default)]
    pub address_string: String,
    #[serde(default)]
    pub latitude: String,
    #[serde(default)]
    pub longitude: String,
    #[serde(default)]
    pub summary_text: String,
    /// Natural key: the feed item's permalink.
    #[serde(default)]
    pub source_url: String,
}

impl Incident {
    /// Both coordinates present.
    pub fn is_geocoded(&self) -> bool {
        !self.latitude.trim().is_empty() && !self.longitude.trim().is_empty()
    }

    /// Has an address but is missing at least one coordinate.
    pub fn needs_geocoding(&self) -> bool {
        !self.address_string.trim().is_empty() && !self.is_geocoded()
    }

    /// Sets both coordinates at once so a record is never half-geocoded.
    pub fn set_coordinates(&mut self, lat: f64, lon: f64) {
        self.latitude = lat.to_string();
        self.longitude = lon.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geocoding_candidates_need_an_address_and_a_missing_coordinate() {
        let mut inc = Incident {
            address_string: "4000 15th Ave NE".into(),
            ..Default::default()
        };
        assert!(inc.needs_geocoding());

        inc.latitude = "47.65".into();
        assert!(inc.needs_geocoding(), "one coordinate is not enough");

        inc.set_coordinates(47.6553, -122.3035);
        assert!(inc.is_geocoded());
        assert!(!inc.needs_geocoding());
        assert_eq!(inc.latitude, "47.6553");
        assert_eq!(inc.longitude, "-122.3035");

        let no_addr = Incident::default();
        assert!(!no_addr.needs_geocoding());
    }
}
