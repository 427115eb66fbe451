use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_saga::config::Config;
use order_saga::db::PgOrderStore;
use order_saga::messaging::{
    BatchConsumer, CheckoutHandler, HandlerRegistry, KafkaMessageStream, CHECKOUT_STATUS_TOPIC,
};
use order_saga::metrics::{self, Metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering; override with
    // RUST_LOG, e.g. RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_saga=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order saga worker");

    let config = Config::load()?;

    let store = Arc::new(PgOrderStore::connect(&config.database_url()).await?);
    tracing::info!("connected to order database");

    let metrics = Arc::new(Metrics::new()?);

    // Metrics server gets its own thread and runtime so scrapes never
    // compete with the consumer loop.
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("failed to build metrics runtime");
        rt.block_on(async {
            if let Err(err) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!(error = %err, "metrics server error");
            }
        });
    });

    let mut registry = HandlerRegistry::new();
    registry.register(
        CHECKOUT_STATUS_TOPIC,
        Arc::new(CheckoutHandler::new(store.clone(), metrics.clone())),
    )?;

    let stream = KafkaMessageStream::new(&config.kafka_brokers())?;
    let mut consumer = BatchConsumer::new(stream, registry, metrics.clone());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("caught termination signal, finishing current batch");
        signal_token.cancel();
    });

    // Blocks until cancellation, including the final flush.
    consumer.run(shutdown, &[CHECKOUT_STATUS_TOPIC]).await?;

    tracing::info!("worker shut down cleanly");
    Ok(())
}
