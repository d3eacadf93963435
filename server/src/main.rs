use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dugs_server::config::ServerConfig;
use dugs_server::db::pool::{create_pool, run_migrations};
use dugs_server::db::repository::SqliteRepository;
use dugs_server::engine::directory::CompanyDirectory;
use dugs_server::engine::events::WarEvent;
use dugs_server::engine::war_resolver::WarResolver;

#[derive(Parser, Debug)]
#[command(name = "dugs-server", about = "Guild companies, influence and war tracking")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "dugs.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args.config)?;

    // Initialize database
    let pool = create_pool(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let repo = Arc::new(SqliteRepository::new(pool.clone()));
    let directory = Arc::new(CompanyDirectory::with_store_timeout(
        repo,
        config.database.store_timeout(),
    ));

    // Fill every guild partition before anything reads from the cache
    directory
        .warm_cache()
        .await
        .context("failed to load companies from database")?;

    // War notifications go to the messaging layer; here they are logged.
    let (events_tx, mut events_rx) = mpsc::channel::<WarEvent>(config.war.notification_buffer.max(1));
    let notifier = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!(guild_id = event.guild_id(), %json, "war notification"),
                Err(e) => error!(error = %e, "failed to encode war notification"),
            }
        }
    });

    let cancel = CancellationToken::new();
    let resolver = WarResolver::new(directory, events_tx)
        .with_period(config.war.resolve_interval())
        .with_require_expiry(config.war.require_expiry);
    let resolver_task = tokio::spawn(resolver.run(cancel.clone()));

    info!(
        database = %config.database.url,
        resolve_interval_secs = config.war.resolve_interval_secs,
        "Dugs server started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    cancel.cancel();
    resolver_task.await.context("war resolver task panicked")?;
    // The resolver held the last sender; the notifier drains and exits.
    notifier.await.context("notifier task panicked")?;
    pool.close().await;

    info!("Dugs server stopped");
    Ok(())
}
