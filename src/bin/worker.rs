//! plotwise-worker: runs the daily garden analysis pipeline until Ctrl+C.

use std::sync::Arc;

use plotwise::credentials::HttpKeyUnwrapper;
use plotwise::photos::StoredPhotoSource;
use plotwise::queue::SqliteJobQueue;
use plotwise::store::SqliteGardenStore;
use plotwise::weather::OpenMeteoClient;
use plotwise::{Pipeline, PipelineDeps, PlotwiseConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plotwise=info")),
        )
        .init();

    let config = PlotwiseConfig::load()?;
    info!(
        store = %config.database.store_path.display(),
        queue = %config.database.queue_path.display(),
        "plotwise-worker starting"
    );

    let store = Arc::new(SqliteGardenStore::open(&config.database.store_path)?);
    let queue = Arc::new(SqliteJobQueue::connect(&config.database.queue_path)?);

    let deps = PipelineDeps {
        store: store.clone(),
        queue: queue.clone(),
        providers: config.providers(),
        unwrapper: Arc::new(HttpKeyUnwrapper::from_env(
            config.credentials.unwrap_url.clone(),
        )),
        weather: Arc::new(OpenMeteoClient::new(config.weather.base_url.clone())),
        photos: Arc::new(StoredPhotoSource::new(
            store.clone(),
            config.photos.base_url.clone(),
        )),
    };
    let pipeline = Pipeline::new(deps, config.pipeline_settings());

    let cancel = CancellationToken::new();
    let handles = pipeline.start(&cancel);

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, shutting down...");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }
    queue.close()?;
    info!("plotwise-worker stopped");
    Ok(())
}
