//! CLI entry point for gtfs_nearby.
//!
//! Provides subcommands for a one-off feed sync, a periodic sync loop, a single
//! nearby-stops query, and a JSON-lines event server for a chat front-end.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use gtfs_nearby::{
    config::AppConfig,
    error::ConfigError,
    events::{InboundEvent, handle_event},
    feed::FeedCache,
    fetch::BasicClient,
    live::LiveArrivalClient,
    model::Coordinate,
    nearby::NearbyQueryEngine,
    output::{append_records, print_json, print_pretty},
    report::{PassSummary, SyncRecord},
    store::{FileRegistry, MemoryStopIndex, StopStore},
    sync::SyncOrchestrator,
};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

type Http = Arc<BasicClient>;

#[derive(Parser)]
#[command(name = "gtfs_nearby")]
#[command(about = "Keeps GTFS stop indexes current and answers nearby-stop queries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass over all active repositories
    Sync {
        /// CSV file to append per-repository outcomes to
        #[arg(short, long)]
        report: Option<String>,
    },
    /// Sync periodically until Ctrl+C
    Watch {
        /// CSV file to append per-repository outcomes to
        #[arg(short, long)]
        report: Option<String>,
    },
    /// Print live arrivals for the stops around a position
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Search radius in meters (defaults to NEARBY_RADIUS_METERS)
        #[arg(short, long)]
        radius: Option<f64>,
    },
    /// Sync periodically and answer JSON-lines events from stdin
    Serve {
        /// CSV file to append per-repository outcomes to
        #[arg(short, long)]
        report: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_nearby.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_nearby.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let services = Services::open(&config).await?;

    match cli.command {
        Commands::Sync { report } => {
            run_pass(&services.orchestrator(&config), report.as_deref()).await?;
        }
        Commands::Watch { report } => {
            let orchestrator = Arc::new(services.orchestrator(&config));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested");
                }
                let _ = shutdown_tx.send(true);
            });
            sync_loop(orchestrator, config.sync_interval, report, shutdown_rx).await;
        }
        Commands::Nearby { lat, lon, radius } => {
            // a fresh process with a memory-only index has nothing to query
            if config.stops_path.is_none() {
                return Err(ConfigError::Missing("STOPS_PATH").into());
            }
            let engine = services.engine(&config);
            let radius = radius.unwrap_or(config.nearby_radius_meters);
            let coordinate = Coordinate::new(lat, lon);
            anyhow::ensure!(coordinate.is_valid(), "{lat},{lon} is not a WGS84 position");

            let mut aggregates = engine.find_nearby(coordinate, radius).await?;
            let mut shown = 0;
            while let Some(aggregate) = aggregates.next().await {
                println!("{}", aggregate.render());
                shown += 1;
            }
            info!(stops = shown, radius, "Nearby query done");
        }
        Commands::Serve { report } => {
            serve(&services, &config, report).await?;
        }
    }

    Ok(())
}

/// Shared handles, injected into the orchestrator and the query engine.
struct Services {
    http: Http,
    registry: Arc<FileRegistry>,
    index: Arc<MemoryStopIndex>,
}

impl Services {
    async fn open(config: &AppConfig) -> Result<Self> {
        let http = Arc::new(BasicClient::with_timeout(config.http_timeout)?);

        let registry = FileRegistry::open(&config.repositories_path)
            .await
            .map_err(|source| ConfigError::Repositories {
                path: config.repositories_path.display().to_string(),
                source,
            })?;

        let index = match &config.stops_path {
            Some(path) => MemoryStopIndex::open(path)
                .await
                .with_context(|| format!("failed to open stop snapshot {}", path.display()))?,
            None => {
                warn!("STOPS_PATH not set, stop index lives in memory only and is rebuilt after every restart");
                MemoryStopIndex::new()
            }
        };

        Ok(Self {
            http,
            registry: Arc::new(registry),
            index: Arc::new(index),
        })
    }

    fn orchestrator(&self, config: &AppConfig) -> SyncOrchestrator<Http> {
        let orchestrator = SyncOrchestrator::new(
            self.http.clone(),
            self.registry.clone(),
            StopStore::new(self.index.clone()),
        )
        .with_stale_cutoff_days(config.stale_cutoff_days)
        .with_concurrency(config.sync_concurrency);

        match &config.work_dir {
            Some(dir) => orchestrator.with_cache(FeedCache::new(dir)),
            None => orchestrator,
        }
    }

    fn engine(&self, config: &AppConfig) -> NearbyQueryEngine<Http> {
        NearbyQueryEngine::new(self.index.clone(), LiveArrivalClient::new(self.http.clone()))
            .with_concurrency(config.live_concurrency)
    }
}

/// Runs one pass, logs the summary and optionally appends outcomes to `report`.
#[tracing::instrument(skip(orchestrator))]
async fn run_pass(orchestrator: &SyncOrchestrator<Http>, report: Option<&str>) -> Result<()> {
    let outcomes = orchestrator.sync_all().await?;

    let summary = PassSummary::from_outcomes(&outcomes);
    print_pretty(&summary);
    info!(
        repositories = summary.repositories,
        fresh = summary.fresh,
        unchanged = summary.unchanged,
        imported = summary.imported,
        no_stops_found = summary.no_stops_found,
        failed = summary.failed,
        stops_imported = summary.stops_imported,
        "Sync pass summary"
    );

    let now = Utc::now();
    let records: Vec<_> = outcomes
        .iter()
        .map(|o| SyncRecord::from_outcome(o, now))
        .collect();
    for record in &records {
        print_json(record)?;
    }

    if let Some(path) = report {
        append_records(path, &records)?;
    }
    Ok(())
}

/// Sync passes every `interval` until `shutdown` fires. A pass in flight is
/// finished first. A failed pass is logged and retried next tick.
async fn sync_loop(
    orchestrator: Arc<SyncOrchestrator<Http>>,
    interval: Duration,
    report: Option<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if let Err(e) = run_pass(&orchestrator, report.as_deref()).await {
            error!(error = %e, "Sync pass failed");
        }
    }
    info!("Sync loop stopped");
}

/// Background sync plus a stdin/stdout event loop. Stops on Ctrl+C or end of input.
async fn serve(services: &Services, config: &AppConfig, report: Option<String>) -> Result<()> {
    let orchestrator = Arc::new(services.orchestrator(config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = tokio::spawn(sync_loop(
        orchestrator,
        config.sync_interval,
        report,
        shutdown_rx,
    ));

    let engine = services.engine(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Waiting for events on stdin");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        };
        let Some(line) = line else {
            info!("Input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let event = match InboundEvent::parse(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed event");
                continue;
            }
        };

        let delivered = handle_event(&engine, event, config.nearby_radius_meters, |message| {
            match serde_json::to_string(&message) {
                Ok(json) => println!("{json}"),
                Err(e) => error!(error = %e, "Failed to encode message"),
            }
        })
        .await;
        if let Err(e) = delivered {
            error!(error = %e, "Event handling failed");
        }
    }

    let _ = shutdown_tx.send(true);
    sync_task.await?;
    Ok(())
}
