use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use newsbus::{init_logging, network::server, EventStore, NewsService, Settings};
use tracing::{error, info};

/// Сервер новостной ленты newsbus
#[derive(Parser)]
#[command(name = "newsbus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "newsbus - topic-based broadcast bus and news-feed server", long_about = None)]
struct Args {
    /// Путь к файлу настроек
    #[arg(short, long, env = "NEWSBUS_CONFIG", help = "Путь к файлу настроек (TOML)")]
    config: Option<PathBuf>,
    /// Адрес прослушивания
    #[arg(short, long, help = "Адрес прослушивания, например 0.0.0.0:4000")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load_from(args.config.as_deref(), args.listen)
        .context("Failed to load settings")?;
    let logging = init_logging(settings.logging.clone()).context("Failed to initialize logging")?;

    let broker = newsbus::Broker::with_config(settings.channel_config());
    let store = if settings.seed_events {
        EventStore::seeded()
    } else {
        EventStore::new()
    };
    let service = NewsService::new(store, broker);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received");
    };

    let result = server::run(&settings, service, shutdown).await;
    if let Err(e) = &result {
        error!(error = %e, "Server terminated with error");
    }

    logging.shutdown_async(std::time::Duration::from_secs(2)).await;
    result
}
