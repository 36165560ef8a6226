// src/ingest/mod.rs
pub mod address;
pub mod feed;
pub mod fetch;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::incident::Incident;
use crate::ingest::fetch::Fetcher;

pub use address::{extract_address, summarize, AddressMatch};
pub use feed::{parse_feed, FeedError};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_items_total", "Items parsed from the alert feed.");
        describe_counter!(
            "feed_errors_total",
            "Feed fetch or parse failures (run continued with no candidates)."
        );
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Builds a candidate from the raw (trimmed) item fields. Reserved fields and
/// coordinates stay empty.
pub fn build_incident(
    title: String,
    source_url: String,
    post_date: String,
    description: String,
) -> Incident {
    let address_string = extract_address(&description)
        .map(|m| m.fragment)
        .unwrap_or_default();
    let summary_text = summarize(&description, &address_string);
    Incident {
        title,
        post_date,
        address_string,
        summary_text,
        source_url,
        ..Default::default()
    }
}

/// Fetches `url` and parses it into candidates.
///
/// Never fails: an unreachable, disallowed or malformed feed is logged and
/// yields an empty batch so the rest of the pipeline can still run.
pub async fn fetch_candidates(fetcher: &dyn Fetcher, url: &str) -> Vec<Incident> {
    ensure_metrics_described();

    let body = match fetcher.fetch(url).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(target: "ingest", error = %e, fetcher = fetcher.name(), url, "feed fetch failed");
            counter!("feed_errors_total").increment(1);
            return Vec::new();
        }
    };

    match parse_feed(&body) {
        Ok(items) => {
            tracing::info!(target: "ingest", count = items.len(), url, "parsed feed");
            items
        }
        Err(e) => {
            tracing::warn!(target: "ingest", error = %e, url, bytes = body.len(), "feed parse failed");
            counter!("feed_errors_total").increment(1);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fetch::{FetchError, FixtureFetcher};
    use async_trait::async_trait;

    struct Blocked;

    #[async_trait]
    impl Fetcher for Blocked {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Disallowed {
                url: url.to_string(),
                reason: "robots.txt".into(),
            })
        }
        fn name(&self) -> &'static str {
            "blocked"
        }
    }

    #[tokio::test]
    async fn fetch_failure_yields_empty_batch() {
        let out = fetch_candidates(&Blocked, "https://emergency.uw.edu/feed/").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn malformed_feed_yields_empty_batch() {
        let f = FixtureFetcher::from_str("<<not xml");
        assert!(fetch_candidates(&f, "https://x.test/feed").await.is_empty());
    }

    #[test]
    fn build_incident_fills_derived_fields_only() {
        let inc = build_incident(
            "Bike theft".into(),
            "https://e.test/1".into(),
            "Mon, 03 Jun 2024".into(),
            "4000 15th Ave NE. Bike stolen from rack.".into(),
        );
        assert_eq!(inc.address_string, "4000 15th Ave NE.");
        assert_eq!(inc.summary_text, "Bike stolen from rack.");
        assert_eq!(inc.source_url, "https://e.test/1");
        assert!(inc.id.is_empty());
    }
}
