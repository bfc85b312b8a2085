/// Main entry point for the rate service
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use coinrates::{
    cache::ResultCache,
    config::load_config,
    logging,
    provider::CryptoCompareClient,
    query::{QueryOp, RateQueryService},
    storage::{RateStore, SqliteRateStore},
    sync::{spawn_refresh_loop, RateSynchronizer},
    Config, RatesError, SyncKind, SyncMode, TitleCheck,
};

#[derive(Parser)]
#[command(name = "coinrates", about = "Crypto rate sync and aggregation service")]
struct Cli {
    /// Path to the TOML config (falls back to CONFIG_PATH, then config.toml)
    #[arg(long, short)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduled full refresh until Ctrl+C
    Serve,
    /// Run one synchronization and print its report
    Sync {
        /// full-refresh or gap-fill
        #[arg(long, default_value = "full-refresh")]
        mode: String,
        /// Comma-separated titles to check for gaps (gap-fill only)
        #[arg(long, value_delimiter = ',')]
        titles: Vec<String>,
    },
    /// Answer one query and print the coins as JSON
    Query {
        /// last, max, min, avg or percent
        op: String,
        #[arg(long, value_delimiter = ',', required = true)]
        titles: Vec<String>,
    },
}

/// Wired service components
pub struct RatesApp {
    config: Arc<Config>,
    store: Arc<dyn RateStore>,
    synchronizer: Arc<RateSynchronizer>,
    queries: RateQueryService,
    shutdown: CancellationToken,
}

impl RatesApp {
    pub fn new(config: Config) -> coinrates::Result<Self> {
        let config = Arc::new(config);
        let shutdown = CancellationToken::new();

        let store: Arc<dyn RateStore> = Arc::new(SqliteRateStore::open(
            &config.database.path,
            config.database.pool_size,
        )?);
        info!("Rate store opened at {}", config.database.path);

        let source = Arc::new(CryptoCompareClient::new(&config.client)?);
        let synchronizer = Arc::new(RateSynchronizer::new(
            Arc::clone(&store),
            source,
            config.service.actual_titles.clone(),
        ));

        let mut queries = RateQueryService::new(Arc::clone(&store), Arc::clone(&synchronizer))
            .with_cancellation(shutdown.clone());
        if config.service.cache_ttl_min > 0 {
            queries = queries.with_cache(Arc::new(ResultCache::from_minutes(
                config.service.cache_ttl_min,
            )));
        }
        if let Some(secs) = config.service.query_timeout_sec {
            queries = queries.with_timeout(Duration::from_secs(secs));
        }

        Ok(RatesApp {
            config,
            store,
            synchronizer,
            queries,
            shutdown,
        })
    }

    /// Cancel the shutdown token on Ctrl+C
    fn setup_shutdown_handler(&self) {
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received - initiating graceful shutdown"),
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
            shutdown.cancel();
        });
    }

    pub async fn serve(&self) -> coinrates::Result<()> {
        self.setup_shutdown_handler();

        let period = Duration::from_secs(self.config.service.refresh_interval_sec);
        let handle = spawn_refresh_loop(
            Arc::clone(&self.synchronizer),
            period,
            self.shutdown.clone(),
        );

        handle
            .await
            .map_err(|e| RatesError::Internal(format!("refresh loop panicked: {}", e)))?;

        let known = self.store.list_known_titles().await?;
        info!("Shutdown complete ({} titles known)", known.len());
        Ok(())
    }

    pub async fn sync(&self, kind: SyncKind, titles: Vec<String>) -> coinrates::Result<()> {
        let mode = match kind {
            SyncKind::FullRefresh => SyncMode::FullRefresh,
            SyncKind::GapFill => {
                if titles.is_empty() {
                    return Err(RatesError::InvalidParam(
                        "gap-fill needs --titles".to_string(),
                    ));
                }
                match self.synchronizer.resolve(&titles).await? {
                    TitleCheck::Complete => {
                        info!("All requested titles are already known");
                        SyncMode::GapFill(Vec::new())
                    }
                    TitleCheck::Partial { missing } => SyncMode::GapFill(missing),
                }
            }
        };

        let report = self.synchronizer.synchronize(mode).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    pub async fn query(&self, op: QueryOp, titles: Vec<String>) -> coinrates::Result<()> {
        let coins = self.queries.query(op, &titles).await?;
        println!("{}", serde_json::to_string_pretty(&coins)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(|| std::env::var("CONFIG_PATH").ok())
        .unwrap_or_else(|| "config.toml".to_string());

    let config = load_config(&config_path)
        .with_context(|| format!("loading config from {}", config_path))?;
    logging::init(&config.logging)?;

    info!("Starting coinrates ({})", config_path);
    let app = RatesApp::new(config).context("initializing service")?;

    let outcome = match cli.command {
        Command::Serve => app.serve().await,
        Command::Sync { mode, titles } => match mode.parse::<SyncKind>() {
            Ok(kind) => app.sync(kind, titles).await,
            Err(e) => Err(e),
        },
        Command::Query { op, titles } => match op.parse::<QueryOp>() {
            Ok(op) => app.query(op, titles).await,
            Err(e) => Err(e),
        },
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            println!("no data");
            info!("{}", e);
            std::process::exit(2);
        }
        Err(e) => {
            error!("{} ({})", e, e.error_code());
            Err(e.into())
        }
    }
}
