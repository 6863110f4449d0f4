use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pr_reviewer::bitbucket::BitbucketClient;
use pr_reviewer::config::{Config, StoreBackend};
use pr_reviewer::filter::ExclusionFilter;
use pr_reviewer::review::ReviewService;
use pr_reviewer::router::RequestRouter;
use pr_reviewer::shutdown::shutdown_signal;
use pr_reviewer::{api, mcp};
use review_core::{MemoryStore, ReviewStore, SqliteStore};

#[derive(Parser)]
#[command(name = "pr-reviewer")]
#[command(about = "File-by-file pull request review for AI assistants")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API (defaults to PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start MCP server via stdio (the default)
    Mcp,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "pr_reviewer=info,review_core=info,tower_http=info".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = open_store(&config).await?;
    let router = build_router(&config, store.clone())?;

    let result = match cli.command.unwrap_or(Commands::Mcp) {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            tracing::info!("Starting PR reviewer HTTP API on port {}", port);

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!("PR reviewer listening on http://127.0.0.1:{}", port);

            api::serve(listener, router, shutdown_signal())
                .await
                .map_err(anyhow::Error::from)
        }
        Commands::Mcp => mcp::run_stdio_server(router).await,
    };

    // Both modes end here after a shutdown signal.
    store.close().await?;
    tracing::info!("Review store closed");
    result
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ReviewStore>> {
    let store: Arc<dyn ReviewStore> = match config.store_backend {
        StoreBackend::Sqlite => {
            tracing::info!("Using review database: {}", config.db_path.display());
            Arc::new(SqliteStore::new(&config.db_path))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory review store; progress is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    store
        .initialize()
        .await
        .context("Failed to initialize review store")?;
    Ok(store)
}

fn build_router(config: &Config, store: Arc<dyn ReviewStore>) -> anyhow::Result<RequestRouter> {
    let source = BitbucketClient::new(config.bitbucket.clone())?;
    let filter = ExclusionFilter::new(&config.exclude_patterns)?;
    let service = ReviewService::new(
        store,
        Arc::new(source),
        filter,
        config.custom_prompt.clone(),
    );
    Ok(RequestRouter::new(service))
}
