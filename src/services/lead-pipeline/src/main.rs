//! Main binary for the lead pipeline
//!
//! Serves the contact form and admin API, and runs the lead-created trigger
//! listener against the configured document store.

use lead_pipeline::{
    config::PipelineConfig,
    routes::create_router,
    store::{InMemoryStore, MongoStore, StoreHandles},
    transport::build_transport_or_unconfigured,
    LeadPipeline,
};

use anyhow::{Context, Result};
use axum::serve;
use clap::{Arg, Command};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal outside development
    dotenvy::dotenv().ok();

    let matches = create_cli().get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    init_tracing(log_level);

    let config = load_config(&matches)?;
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        anyhow::bail!("invalid configuration: {}", e);
    }

    info!("Starting lead pipeline");
    info!(
        "Configuration: Server {}:{}, email provider {:?}, trigger enabled={}",
        config.server.host, config.server.port, config.email.provider, config.trigger.enabled
    );

    let stores = open_store(&config).await?;
    let transport = build_transport_or_unconfigured(&config.email);

    let pipeline = Arc::new(
        LeadPipeline::new(config.clone(), stores, transport)
            .context("failed to initialize lead pipeline")?,
    );

    let cancellation_token = CancellationToken::new();

    let listener_task = if config.trigger.enabled {
        Some(
            pipeline
                .trigger_listener()
                .spawn(cancellation_token.clone())
                .context("failed to start trigger listener")?,
        )
    } else {
        warn!("Trigger listener disabled; leads are only dispatched via the webhook");
        None
    };

    let app = create_router(pipeline.clone());

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .with_context(|| format!("invalid host address '{}'", config.server.host))?,
        config.server.port,
    );

    let tcp_listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("Lead pipeline started successfully on {}", addr);
    info!("Health check: http://{}/health", addr);
    if config.metrics.enabled {
        info!("Metrics: http://{}/metrics", addr);
    }

    let server_task = tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            let shutdown = async move { cancellation_token.cancelled().await };
            if let Err(e) = serve(tcp_listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Server error: {}", e);
            }
        }
    });

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    cancellation_token.cancel();

    if let Err(e) = server_task.await {
        error!("Server task error during shutdown: {}", e);
    }

    if let Some(listener_task) = listener_task {
        if let Err(e) = listener_task.await {
            error!("Trigger listener error during shutdown: {}", e);
        }
    }

    info!("Lead pipeline stopped gracefully");
    Ok(())
}

/// Initialize tracing; `RUST_LOG` wins over `--log-level`
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "lead_pipeline={level},lead_pipeline_server={level},tower_http={level},mongodb=warn",
            level = log_level
        )
        .into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Create CLI argument parser
fn create_cli() -> Command {
    Command::new("lead-pipeline-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lead intake and notification pipeline")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Server host address (overrides configuration)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port (overrides configuration)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
}

/// Load configuration from file and environment, then apply CLI overrides
fn load_config(matches: &clap::ArgMatches) -> Result<PipelineConfig> {
    let config_file = matches.get_one::<String>("config").map(String::as_str);
    if let Some(config_file) = config_file {
        info!("Loading configuration from file: {}", config_file);
    }

    let mut config = PipelineConfig::load(config_file).context("failed to load configuration")?;

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }

    if let Some(port_str) = matches.get_one::<String>("port") {
        config.server.port = port_str
            .parse()
            .with_context(|| format!("invalid port number '{}'", port_str))?;
    }

    Ok(config)
}

async fn open_store(config: &PipelineConfig) -> Result<StoreHandles> {
    if config.uses_mongo() {
        let store = MongoStore::connect(&config.database)
            .await
            .context("failed to connect to MongoDB")?;
        Ok(StoreHandles::mongo(Arc::new(store)))
    } else {
        warn!("No MongoDB URL configured, using the in-memory store; leads will not survive a restart");
        Ok(StoreHandles::in_memory(Arc::new(InMemoryStore::new())))
    }
}

/// Wait for shutdown signals
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
