use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod catalog;
mod config;
mod enrichment;
mod errors;
mod http;
mod lifecycle;
mod messaging;
mod metrics;
mod models;
mod store;
mod utils;

use catalog::CatalogClient;
use config::Config;
use enrichment::Enricher;
use lifecycle::{run_stock_consumer, OrderService};
use messaging::EventChannel;
use metrics::Metrics;
use store::{MemoryOrderStore, OrderStore, ScyllaOrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Structured logging with environment-based filtering.
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_reconciler=debug")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting order reconciliation service");

    let metrics = Arc::new(Metrics::new()?);

    // === 1. Order store ===
    let store: Arc<dyn OrderStore> = if config.test_mode {
        tracing::warn!("Test mode: orders held in the in-memory store");
        Arc::new(MemoryOrderStore::new())
    } else {
        tracing::info!(node = %config.scylla_node, "Connecting to ScyllaDB");
        let session: Session = SessionBuilder::new()
            .known_node(&config.scylla_node)
            .build()
            .await?;
        ScyllaOrderStore::init_schema(&session, &config.keyspace).await?;
        Arc::new(ScyllaOrderStore::new(Arc::new(session)))
    };

    // === 2. Event channel ===
    // A broker that stays unreachable after the bounded retry is fatal:
    // serving traffic without the reconciliation path would leave every
    // created order stuck in pending. Test mode downgrades this to an
    // observable skip.
    let channel = match EventChannel::connect(&config.channel, metrics.clone()).await {
        Ok(channel) => Some(Arc::new(channel)),
        Err(err) if config.test_mode => {
            tracing::warn!(error = %err, "Event channel skipped in test mode");
            None
        }
        Err(err) => return Err(err.context("event channel startup failed")),
    };

    // === 3. Enrichment ===
    let catalog = Arc::new(CatalogClient::new(
        config.catalog_url.clone(),
        config.catalog_timeout,
        config.catalog_auth,
        metrics.clone(),
    )?);
    let enricher = Enricher::new(catalog);

    // === 4. Lifecycle reconciler ===
    let service = Arc::new(OrderService::new(
        store,
        channel.clone(),
        enricher,
        metrics.clone(),
        config.conflict_policy,
    ));

    if let Some(channel) = channel {
        tokio::spawn(run_stock_consumer(
            channel,
            service.clone(),
            config.handler_deadline,
        ));
    }

    // === 5. HTTP surface (orders API + /metrics + /health) ===
    let registry = Arc::new(metrics.registry().clone());
    http::start_http_server(service, registry, config.http_port).await?;

    tracing::info!("Shutting down");
    Ok(())
}
