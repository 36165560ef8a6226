// src/pipeline.rs
//! Fetch → parse → append → enrich, once per trigger.

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::dedup::append_new;
use crate::enrich::{EnrichError, EnrichOptions, Enricher};
use crate::geocode::Geocoder;
use crate::ingest::fetch::Fetcher;
use crate::ingest::fetch_candidates;
use crate::store::{Store, StoreError};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline runs started.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when the pipeline last finished."
        );
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub appended: usize,
    pub geocoded_processed: usize,
    pub geocoded_updated: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("append aborted: {0}")]
    Append(#[source] StoreError),
    #[error("appended {appended} incidents, then geocoding failed: {source}")]
    Enrich {
        appended: usize,
        #[source]
        source: EnrichError,
    },
}

impl PipelineError {
    /// Best-effort counts for callers that report partial work.
    pub fn partial_summary(&self) -> RunSummary {
        match self {
            Self::Append(_) => RunSummary::default(),
            Self::Enrich { appended, source } => match source {
                EnrichError::Load(_) => RunSummary {
                    appended: *appended,
                    ..Default::default()
                },
                EnrichError::Persist {
                    processed, updated, ..
                } => RunSummary {
                    appended: *appended,
                    geocoded_processed: *processed,
                    geocoded_updated: *updated,
                },
            },
        }
    }
}

pub struct Pipeline {
    feed_url: String,
    fetcher: Arc<dyn Fetcher>,
    store: Store,
    enricher: Enricher,
}

impl Pipeline {
    pub fn new(
        feed_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        geocoder: Arc<dyn Geocoder>,
        store: Store,
        enrich_opts: EnrichOptions,
    ) -> Self {
        Self {
            feed_url: feed_url.into(),
            fetcher,
            store,
            enricher: Enricher::new(geocoder, enrich_opts),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// One full run. An empty feed, an all-duplicate batch or failed lookups
    /// are ordinary outcomes reflected in the counts; only store failures are
    /// errors. Geocoding is skipped when nothing new was appended.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        ensure_metrics_described();
        counter!("pipeline_runs_total").increment(1);

        let candidates = fetch_candidates(self.fetcher.as_ref(), &self.feed_url).await;
        let fetched = candidates.len();
        let appended = self
            .store
            .blocking(move |store| append_new(&store, candidates))
            .await
            .map_err(PipelineError::Append)?;

        let summary = if appended == 0 {
            tracing::info!(target: "pipeline", fetched, "nothing new appended; geocoding skipped");
            RunSummary::default()
        } else {
            let report = self
                .enricher
                .enrich(&self.store)
                .await
                .map_err(|source| PipelineError::Enrich { appended, source })?;
            RunSummary {
                appended,
                geocoded_processed: report.processed,
                geocoded_updated: report.updated,
            }
        };

        let now = chrono::Utc::now().timestamp().max(0) as f64;
        gauge!("pipeline_last_run_ts").set(now);
        tracing::info!(
            target: "pipeline",
            fetched,
            appended = summary.appended,
            geocoded_processed = summary.geocoded_processed,
            geocoded_updated = summary.geocoded_updated,
            "pipeline run complete"
        );
        Ok(summary)
    }
}
