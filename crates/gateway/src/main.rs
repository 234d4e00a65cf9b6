//! `omniboxd`, the gateway daemon: config, store, connectors, scheduler,
//! HTTP server, and an orderly shutdown that stops the scheduler.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    anyhow::Context,
    clap::Parser,
    sqlx::SqlitePool,
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use {
    omnibox_accounts::{
        AccountStore, MessageStore, SqliteAccountStore, SqliteMessageStore, init_schema,
    },
    omnibox_connectors::ConnectorRegistry,
    omnibox_gateway::{AppState, GatewayConfig, serve},
    omnibox_oauth::StateCodec,
    omnibox_sync::{SyncService, WebhookIngress},
};

#[derive(Parser)]
#[command(name = "omniboxd", about = "Unified social inbox gateway", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "OMNIBOX_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// SQLite database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://omnibox.db?mode=rwc")]
    database_url: String,

    /// Minutes between scheduled sync passes.
    #[arg(long, env = "SYNC_INTERVAL_MINUTES", default_value_t = 5)]
    sync_interval_minutes: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = GatewayConfig::from_env()?;
    config.log_summary();

    let pool = SqlitePool::connect(&args.database_url)
        .await
        .with_context(|| format!("opening database {}", args.database_url))?;
    init_schema(&pool).await?;

    let accounts: Arc<dyn AccountStore> = Arc::new(SqliteAccountStore::new(pool.clone()));
    let messages: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(pool));
    let registry = Arc::new(ConnectorRegistry::from_config(&config.platforms));
    info!(platforms = ?registry.platforms(), "connectors registered");

    let sync = SyncService::new(
        Arc::clone(&accounts),
        Arc::clone(&messages),
        Arc::clone(&registry),
    );
    sync.start(Duration::from_secs(args.sync_interval_minutes * 60))
        .await;

    let ingress = Arc::new(WebhookIngress::new(
        Arc::clone(&accounts),
        Arc::clone(&messages),
        Arc::clone(&registry),
    ));

    let state = AppState {
        codec: StateCodec::new(config.state_key.as_bytes()),
        registry,
        accounts,
        sync: Arc::clone(&sync),
        ingress,
        frontend_url: config.frontend_url,
    };

    tokio::select! {
        result = serve(state, args.bind) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        },
    }

    sync.stop().await;
    Ok(())
}
