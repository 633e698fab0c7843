use std::sync::Arc;
use futures_util::stream::{self, StreamExt};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crpt_gateway::config::Config;
use crpt_gateway::document::DocumentBuilder;
use crpt_gateway::http::DocumentGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting document gateway driver...");
    info!(
        "Limit: {} requests per {:?}, {} documents to {}",
        config.request_limit, config.time_unit, config.documents, config.endpoint
    );

    let gateway = Arc::new(DocumentGateway::with_http(&config.limiter(), &config.gateway())?);

    // Bounded fan-out: callers beyond the window limit just queue on the pool.
    let concurrency = (config.request_limit as usize).max(1) * 2;
    let submissions = {
        let gateway = gateway.clone();
        let signature = config.signature.clone();
        stream::iter(0..config.documents)
            .map(move |i| {
                let gateway = gateway.clone();
                let signature = signature.clone();
                async move {
                    let document = DocumentBuilder::random();
                    match gateway.submit(&document, &signature).await {
                        Ok(status) => info!("Document {} -> response code {}", i, status),
                        Err(e) if e.is_cancelled() => warn!("Document {} cancelled", i),
                        Err(e) => error!("Document {} failed: {}", i, e),
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<()>>()
    };

    tokio::select! {
        _ = submissions => info!("All documents submitted."),
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Interrupted, shutting down...");
        }
    }

    gateway.shutdown().await;
    gateway.stats().log_stats();

    Ok(())
}
