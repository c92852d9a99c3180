use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use covercache::application::FetchCoversUseCase;
use covercache::infrastructure::{AppConfig, CliArgs, Command, ImageCache, StorageManager};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage
        .load_config(args.config.as_deref())
        .wrap_err("Failed to load configuration")?;
    config.merge_with_args(args);
    Ok(config)
}

async fn run(cache: ImageCache, command: Command) -> Result<()> {
    match command {
        Command::Fetch { urls } => {
            let outcomes = FetchCoversUseCase::new(cache).execute(&urls).await;
            for outcome in outcomes {
                match &outcome.result {
                    Ok(report) => println!(
                        "{} -> {} ({}, {} bytes, {})",
                        outcome.url, report.handle, report.content_type, report.size, report.source
                    ),
                    Err(e) => println!("{} -> {} (failed: {e})", outcome.url, outcome.src()),
                }
            }
        }
        Command::Stats => {
            cache.wait_for_startup_sweep().await;
            println!("{}", cache.get_cache_stats().await);
        }
        Command::Cleanup => {
            let at_startup = cache.wait_for_startup_sweep().await;
            let purged = at_startup + cache.manual_cleanup().await;
            println!("Purged {purged} expired entries");
        }
        Command::Clear => {
            cache.wait_for_startup_sweep().await;
            cache
                .clear_cache()
                .await
                .wrap_err("Durable store clear did not complete")?;
            println!("Cache cleared");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = covercache::VERSION, "Starting covercache");

    let cache =
        ImageCache::from_config(&config.cache).wrap_err("Failed to create HTTP client")?;
    info!(dir = %config.cache.effective_dir().display(), "Image cache ready");

    run(cache, args.command).await
}
