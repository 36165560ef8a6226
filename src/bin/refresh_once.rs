//! Runs the full fetch → append → geocode pipeline once and logs the summary.

use incident_mapper::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    incident_mapper::init_tracing();

    let cfg = AppConfig::load_default()?;
    let pipeline = incident_mapper::build_pipeline(&cfg)?;
    let summary = pipeline.run().await?;

    let line = serde_json::to_string(&summary)?;
    tracing::info!(summary = %line, "refresh-once done");
    Ok(())
}
