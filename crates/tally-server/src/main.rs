use anyhow::{bail, Result};
use clap::Parser;
use std::net::SocketAddr;
use tally_core::{AppConfig, AppState};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let mut config = config::Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    init_tracing(config.logging.json);

    if config.auth.jwt_secret.trim().is_empty() {
        bail!("auth.jwt_secret is empty; set it in the config file or TALLY_JWT_SECRET");
    }

    ensure_data_dirs(&config);

    let db = tally_db::create_pool_with_busy_timeout(
        &config.database.url,
        config.database.max_connections,
        config.database.busy_timeout(),
    )
    .await?;
    tally_db::run_migrations(&db).await?;

    let state = AppState::new(
        db,
        AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            trust_proxy: config.server.trust_proxy,
            vote_deadline: config.engine.vote_deadline(),
        },
    );

    let app = tally_api::build_router()
        .layer(tally_api::cors_layer(&config.server.cors_origins))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind = %config.server.bind_address,
        database = %config.database.url,
        trust_proxy = config.server.trust_proxy,
        "tally server listening"
    );

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tally=info,tower_http=debug"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Ensure the SQLite file's parent directory exists before connecting.
fn ensure_data_dirs(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}
