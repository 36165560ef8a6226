// src/dedup.rs
//! Duplicate-safe append of feed candidates into the store.

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::incident::Incident;
use crate::store::{Store, StoreError};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("store_appended_total", "Incidents appended to the store.");
        describe_counter!(
            "store_duplicates_total",
            "Candidates skipped because their source_url was already known."
        );
    });
}

/// Appends every candidate whose `source_url` is non-empty and not yet seen,
/// either in the store or earlier in `candidates`. Returns how many rows were
/// written.
///
/// A store that cannot be read aborts the whole batch before anything is
/// written; appending blind would risk duplicating every row.
pub fn append_new<I>(store: &Store, candidates: I) -> Result<usize, StoreError>
where
    I: IntoIterator<Item = Incident>,
{
    ensure_metrics_described();

    let mut seen = store.source_urls()?;
    let mut accepted = Vec::new();
    let mut skipped = 0usize;

    for inc in candidates {
        if inc.source_url.is_empty() {
            tracing::debug!(target: "store", title = %inc.title, "skipping candidate without source_url");
            skipped += 1;
            continue;
        }
        if !seen.insert(inc.source_url.clone()) {
            tracing::debug!(target: "store", url = %inc.source_url, title = %inc.title, "skipping duplicate incident");
            skipped += 1;
            continue;
        }
        accepted.push(inc);
    }

    counter!("store_duplicates_total").increment(skipped as u64);
    if accepted.is_empty() {
        tracing::info!(target: "store", skipped, "no new incidents to append");
        return Ok(0);
    }

    store.append(&accepted)?;
    counter!("store_appended_total").increment(accepted.len() as u64);
    tracing::info!(
        target: "store",
        appended = accepted.len(),
        skipped,
        path = %store.path().display(),
        "appended new incidents"
    );
    Ok(accepted.len())
}
