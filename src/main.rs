use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use retail_gateway::api::{AppState, create_router};
use retail_gateway::auth::AccessTokenProvider;
use retail_gateway::config::{Config, ConfigHandle, DEFAULT_CONFIG_PATH};
use retail_gateway::retail::RetailClient;

#[derive(Parser, Debug)]
#[command(name = "retail-gateway")]
#[command(about = "HTTP front for product search, autocomplete and product lookup")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, env = "RETAIL_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Running locally: authenticate with the credentials file
    #[arg(long)]
    local: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Print a product as JSON
    Product {
        /// Product id; defaults to `sample_product_id` from the config
        product_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    // Bridge log crate -> tracing (so log::info! etc. work)
    tracing_log::LogTracer::init()?;

    let cli = Cli::parse();

    let config = Config::load(&cli.config).context("failed to load configuration")?;
    tracing::info!("\"config\": {}", config.pretty());

    let tokens = AccessTokenProvider::from_environment(cli.local, &config.credentials_file)
        .context("failed to load credentials")?;
    let retail = RetailClient::new(&config.api_endpoint, Arc::new(tokens));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config, config, retail).await,
        Command::Product { product_id } => print_product(&config, &retail, product_id).await,
    }
}

async fn serve(config_path: &Path, config: Config, retail: RetailClient) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let config = ConfigHandle::new(config);
    let shutdown = CancellationToken::new();

    if let Err(e) = config.watch(config_path.to_path_buf(), shutdown.clone()) {
        tracing::warn!("config hot reload disabled: {e}");
    }

    let router = create_router(AppState::new(retail, config));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on {addr}");

    tokio::spawn(shutdown_signal(shutdown.clone()));
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}

async fn print_product(
    config: &Config,
    retail: &RetailClient,
    product_id: Option<String>,
) -> anyhow::Result<()> {
    let product_id = product_id
        .or_else(|| config.sample_product_id.clone())
        .ok_or_else(|| anyhow!("no product id given and sample_product_id is not set"))?;
    let name = config.product_name(&product_id);

    let product = retail
        .get_product(&name)
        .await
        .with_context(|| format!("failed to get product {name}"))?;
    println!("{}", serde_json::to_string_pretty(&product)?);
    Ok(())
}
