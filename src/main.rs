use std::net::SocketAddr;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use bulkmail::{server, BatchIntake, Config, DeliveryScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let store = config.job_store().await?;
    let transports = config.transport_factory()?;

    tracing::info!(
        version = bulkmail::VERSION,
        provider = transports.provider_name(),
        store = ?config.job_store_path,
        "Starting bulkmail"
    );

    let scheduler = DeliveryScheduler::new(store.clone(), transports)
        .with_config(config.scheduler.clone())
        .start();

    let intake = BatchIntake::new(store).default_sender_name(&config.default_sender_name);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let served = server::serve(addr, server::create_router(intake)).await;

    scheduler.shutdown().await;
    served?;
    Ok(())
}
