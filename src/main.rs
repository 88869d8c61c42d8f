use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use keyshop::config::Config;
use keyshop::db::{self, AppState, queries};
use keyshop::duration::parse_duration;
use keyshop::notify::Notifier;
use keyshop::payments::{PaymentGateway, QrisClient, SimulatedGateway};
use keyshop::{app, reconcile};

#[derive(Parser)]
#[command(name = "keyshop", about = "License key sales and lifecycle server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Prune expired, non-frozen keys and exit
    Sweep,
    /// Add or subtract time on a key, e.g. `keyshop adjust AXSTOOLS-... 7d12h`
    Adjust { key: String, duration: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyshop=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sweep => sweep(config),
        Command::Adjust { key, duration } => adjust(config, &key, &duration),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::new_pool(&config.database_path)
        .with_context(|| format!("opening database at {}", config.database_path))?;

    let gateway: Arc<dyn PaymentGateway> = if config.dev_mode {
        tracing::warn!("dev mode: using simulated payment gateway (auto-pays after 10s)");
        Arc::new(SimulatedGateway::new(10))
    } else {
        Arc::new(QrisClient::new(
            &config.gateway_base_url,
            &config.gateway_api_key,
        ))
    };

    let state = AppState {
        db: pool,
        gateway,
        notifier: Notifier::new(config.notify_webhook_url.clone()),
        loader_url: config.loader_url.clone(),
        admin_token: config.admin_token.clone(),
        gateway_webhook_secret: config.gateway_webhook_secret.clone(),
        payment_window_minutes: config.payment_window_minutes,
    };

    // Third reconciliation trigger: a server-side poll loop alongside the
    // webhook and the clients' own status polling.
    let poll_state = state.clone();
    let poll_interval = config.reconcile_poll_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(poll_interval));
        loop {
            ticker.tick().await;
            if let Err(e) = reconcile::reconcile_pending_once(&poll_state).await {
                tracing::warn!("reconcile pass failed: {}", e);
            }
        }
    });

    let addr = config.addr();
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn sweep(config: Config) -> anyhow::Result<()> {
    let pool = db::new_pool(&config.database_path)?;
    let conn = pool.get()?;
    let pruned = queries::prune_expired_keys(&conn, Utc::now().timestamp())?;
    println!("pruned {} expired key(s)", pruned);
    Ok(())
}

fn adjust(config: Config, key: &str, duration: &str) -> anyhow::Result<()> {
    let delta = parse_duration(duration).map_err(|e| anyhow::anyhow!(e))?;
    let pool = db::new_pool(&config.database_path)?;
    let conn = pool.get()?;

    let record = queries::get_key(&conn, key)?
        .with_context(|| format!("key '{}' not found", key))?;

    let written = if record.is_frozen() {
        let remaining = record.frozen_remaining_ms.unwrap_or(0);
        queries::set_frozen_remaining_cas(
            &conn,
            &record.key,
            record.version,
            remaining + delta.num_milliseconds(),
        )?
    } else {
        queries::set_key_expiry_cas(
            &conn,
            &record.key,
            record.version,
            record.expires_at + delta.num_seconds(),
        )?
    };
    anyhow::ensure!(written, "key '{}' was modified concurrently, try again", key);

    let updated = queries::get_key(&conn, key)?
        .with_context(|| format!("key '{}' not found", key))?;
    println!(
        "{}: expires_at={} frozen_remaining_ms={:?}",
        updated.key, updated.expires_at, updated.frozen_remaining_ms
    );
    Ok(())
}
