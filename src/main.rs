//! CLI entry point for the vehicle snapshot pipeline.
//!
//! Provides subcommands for continuously polling the realtime feed, running a
//! single cycle against a URL or a captured file, and querying the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use vehicle_snapshot::{
    config::Config,
    fleet::FleetCategory,
    fetch::{BasicClient, FeedSource, FileFeedSource, HttpFeedSource, auth::UrlParam},
    output::{append_record, print_json, write_json, write_vehicles_csv},
    publisher::SnapshotPublisher,
    query::{QueryEngine, fleet_stats},
    reference::ReferenceMetadata,
    snapshot::Snapshot,
    stats::CycleStats,
};

#[derive(Parser)]
#[command(name = "vehicle_snapshot")]
#[command(about = "Ingests a GTFS-RT vehicle feed into queryable snapshots", long_about = None)]
struct Cli {
    /// TOML config file (overrides CONFIG_FILE)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed on the configured interval until Ctrl+C
    Run {
        /// CSV file to append per-cycle statistics to
        #[arg(short, long)]
        stats_output: Option<PathBuf>,
    },
    /// Run a single cycle and export the snapshot
    Once {
        /// Path to a captured feed file or URL (defaults to the configured feed)
        #[arg(value_name = "FILE_OR_URL")]
        source: Option<String>,

        /// Write the snapshot's vehicles to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the snapshot to this JSON file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Log the full snapshot as JSON
        #[arg(long)]
        print: bool,
    },
    /// Run a single cycle and search the snapshot
    Query {
        /// Path to a captured feed file or URL (defaults to the configured feed)
        #[arg(value_name = "FILE_OR_URL")]
        source: Option<String>,

        /// Route prefix to search for (e.g. "534")
        #[arg(short, long)]
        route: Option<String>,

        /// Vehicle id fragment to search for (e.g. "PC12")
        #[arg(short, long)]
        vehicle: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/vehicle_snapshot.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("vehicle_snapshot.log"));

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
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Run { stats_output } => {
            let source = http_source(&config, &config.feed.url)?;
            let reference = load_reference(&config);
            let publisher = build_publisher(Box::new(source), &config, reference);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        let _ = shutdown_tx.send(true);
                    }
                    Err(e) => {
                        error!(error = %e, "Unable to listen for Ctrl+C, polling until killed");
                        // Holding the sender keeps the poll loop running
                        std::future::pending::<()>().await;
                        drop(shutdown_tx);
                    }
                }
            });

            publisher
                .run(config.poll_interval(), shutdown_rx, |outcome| {
                    if let Some(path) = &stats_output {
                        if let Err(e) = append_record(path, &CycleStats::from_outcome(outcome)) {
                            error!(path = %path.display(), error = %e, "Failed to write cycle stats");
                        }
                    }
                    if let Ok(report) = outcome {
                        log_fleet(&report.snapshot);
                    }
                })
                .await;
        }
        Commands::Once {
            source,
            csv,
            json,
            print,
        } => {
            let snapshot = single_cycle(&config, source.as_deref()).await?;
            log_fleet(&snapshot);

            if print {
                print_json(&snapshot)?;
            }
            if let Some(path) = csv {
                write_vehicles_csv(&path, &snapshot)?;
                info!(path = %path.display(), "Vehicles written");
            }
            if let Some(path) = json {
                write_json(&path, &snapshot)?;
                info!(path = %path.display(), "Snapshot written");
            }
        }
        Commands::Query {
            source,
            route,
            vehicle,
        } => {
            let reference = load_reference(&config);
            let source = feed_source(&config, source.as_deref())?;
            let publisher = build_publisher(source, &config, reference);
            publisher.run_cycle().await?;

            let engine = QueryEngine::new(publisher.subscribe());
            if let Some(query) = route {
                let found = engine.search_by_route(&query);
                info!(query = %query, matches = found.len(), "Route search");
                for v in &found {
                    info!("{}", v.summary());
                }
            }
            if let Some(query) = vehicle {
                let found = engine.search_by_vehicle_id(&query);
                info!(query = %query, matches = found.len(), "Vehicle search");
                for v in &found {
                    info!("{}", v.summary());
                }
            }
            for (category, count) in engine.fleet_stats() {
                info!(category = %category, count, "Fleet");
            }
        }
    }

    Ok(())
}

fn load_reference(config: &Config) -> Arc<ReferenceMetadata> {
    Arc::new(ReferenceMetadata::load(
        &config.reference.routes_path,
        &config.reference.stops_path,
    ))
}

fn build_publisher(
    source: Box<dyn FeedSource>,
    config: &Config,
    reference: Arc<ReferenceMetadata>,
) -> SnapshotPublisher<Box<dyn FeedSource>> {
    SnapshotPublisher::new(
        source,
        config.decoder(),
        reference,
        config.geofence,
        config.fleet.clone(),
    )
}

/// HTTP feed with the API key appended as a query parameter.
fn http_source(config: &Config, url: &str) -> Result<HttpFeedSource<UrlParam<BasicClient>>> {
    let key = config.api_key()?;
    let client = BasicClient::with_timeout(config.fetch_timeout())?;
    Ok(HttpFeedSource::new(
        UrlParam::new(client, &config.feed.api_key_param, key),
        url,
    ))
}

/// Resolves a CLI source argument: a URL, a local file, or the configured feed.
fn feed_source(config: &Config, source: Option<&str>) -> Result<Box<dyn FeedSource>> {
    Ok(match source {
        None => Box::new(http_source(config, &config.feed.url)?),
        Some(s) if s.starts_with("http") => Box::new(http_source(config, s)?),
        Some(path) => Box::new(FileFeedSource::new(path)),
    })
}

/// Loads reference data and runs one cycle, returning the published snapshot.
#[tracing::instrument(skip(config))]
async fn single_cycle(config: &Config, source: Option<&str>) -> Result<Arc<Snapshot>> {
    let reference = load_reference(config);
    let publisher = build_publisher(feed_source(config, source)?, config, reference);
    let report = publisher.run_cycle().await?;
    Ok(report.snapshot)
}

fn log_fleet(snapshot: &Snapshot) {
    let stats = fleet_stats(snapshot);
    let count = |c: FleetCategory| stats.get(&c).copied().unwrap_or_default();
    info!(
        sequence = snapshot.sequence,
        vehicles = snapshot.len(),
        dtc = count(FleetCategory::Dtc),
        dimts = count(FleetCategory::Dimts),
        electric = count(FleetCategory::Electric),
        "Fleet breakdown"
    );
}
