use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use downwatch::bot::run_bot;
use downwatch::commands::CommandHandler;
use downwatch::config::Config;
use downwatch::database::{DatabaseImpl, initialize_database};
use downwatch::monitoring::{
    HttpProber, MonitoringScheduler, SchedulerSettings, StatusTracker, TenantCheckCache, TokioClock,
};
use downwatch::notifier::{LogSink, NotificationSink};
use downwatch::pool::create_pool;
use downwatch::telegram::{TelegramClient, TelegramSink};
use logger::init_tracing;

#[derive(Parser)]
#[command(version, about = "Monitor HTTP endpoints and report when they go up or down")]
struct Cli {
    /// Path to the config file (defaults to ~/.config/downwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the chat bot (default)
    Run,
    /// Probe one URL with the on-demand settings and exit
    Check { url: String },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref()).context("Failed to load config")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Check { url } => check(&config, &url).await,
        Command::Config => {
            print!("{config}");
            Ok(())
        }
    }
}

async fn check(config: &Config, url: &str) -> Result<()> {
    let prober = HttpProber::new(config.probe.on_demand_timeout(), config.probe.on_demand_policy)?;
    let outcome = prober.check_now(url).await;

    if outcome.reachable {
        println!("{url} is reachable ({})", outcome.detail());
        Ok(())
    } else {
        anyhow::bail!("{url} is unreachable: {}", outcome.detail())
    }
}

async fn run(config: Config) -> Result<()> {
    let pool = create_pool(&config.database.path).await?;
    {
        let conn = pool.get().await.context("Failed to open database")?;
        initialize_database(&conn).await?;
    }
    info!(path = %config.database.path.display(), "Database ready");

    let database = Arc::new(
        DatabaseImpl::new_from_pool(pool).with_default_interval(config.monitoring.default_interval_seconds),
    );
    let tracker = Arc::new(StatusTracker::new());

    let prober = Arc::new(HttpProber::new(config.probe.timeout(), config.monitoring.policy)?);
    let cache = Arc::new(TenantCheckCache::new(prober, Arc::new(TokioClock), config.monitoring.cache_ttl()));

    let telegram = match &config.telegram.token {
        Some(token) => Some(Arc::new(TelegramClient::new(
            &config.telegram.api_base,
            token,
            std::time::Duration::from_secs(config.telegram.poll_timeout_seconds),
        )?)),
        None => {
            warn!("No Telegram token configured, notifications go to the log only");
            None
        }
    };

    let sink: Arc<dyn NotificationSink> = match &telegram {
        Some(client) => Arc::new(TelegramSink::new(client.clone())),
        None => Arc::new(LogSink),
    };

    let scheduler = Arc::new(MonitoringScheduler::new(
        database.clone(),
        database.clone(),
        cache,
        tracker.clone(),
        sink,
        SchedulerSettings {
            min_interval_seconds: config.monitoring.min_interval_seconds,
            reconcile_interval: config.monitoring.reconcile_interval(),
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = vec![tokio::spawn(scheduler.run(shutdown_rx.clone()))];

    if let Some(client) = telegram {
        let on_demand = Arc::new(HttpProber::new(
            config.probe.on_demand_timeout(),
            config.probe.on_demand_policy,
        )?);
        let handler = Arc::new(CommandHandler::new(database.clone(), database, tracker, on_demand));
        tasks.push(tokio::spawn(run_bot(client, handler, shutdown_rx)));
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);

    for task in futures::future::join_all(tasks).await {
        if let Err(e) = task {
            warn!(error = %e, "Task ended abnormally");
        }
    }

    Ok(())
}
