use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use floret_core::{FalQueueClient, HttpImageFetcher, Pipeline};
use floret_server::{config::Args, logging, rate_limit::GovernorLimiter, router};
use tokio::{self, net::TcpListener};
use tracing::info;

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing();

    // --- Build the generation pipeline ---
    let client = args.http_client().context("failed to build HTTP client")?;
    let backend = FalQueueClient::new(client.clone(), &args.queue_url, args.fal_key.clone())
        .with_poll_interval(args.poll_interval());
    let pipeline = Pipeline::new(backend, HttpImageFetcher::new(client), args.model.clone());
    info!(
        "Generation pipeline configured: model={}, queue={}",
        pipeline.model(),
        args.queue_url
    );

    // --- Rate limiting, pruned in the background ---
    let limiter = Arc::new(GovernorLimiter::new(args.limits()));
    let limits: Vec<String> = limiter.limits().map(ToString::to_string).collect();
    info!("Rate limits per client: {}", limits.join("; "));
    tokio::spawn({
        let limiter = limiter.clone();
        async move {
            let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                limiter.retain_recent();
            }
        }
    });

    let app = router(Arc::new(pipeline), limiter);

    // --- Start the server ---
    let bind_address = args.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    info!("Started server on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
