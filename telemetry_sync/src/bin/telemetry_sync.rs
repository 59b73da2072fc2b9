use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use telemetry_sync::{
    catalog::{
        refresh::{CatalogRefresh, refresh_catalog, refresh_stops},
        repo::PgCatalogRepo,
    },
    config::{AppConfig, DEFAULT_CONFIG_PATH, load_config_path},
    db::{connection, migrate},
    pipeline::{FetchReport, LoadReport, Pipeline, PipelineOptions, RunClock, UnitState},
    staging::StagingStore,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use transit_ingestor::providers::{bustime::BustimeProvider, overpass::OverpassProvider};

#[derive(Parser)]
#[command(version, about = "Transit telemetry sync CLI")]
struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand, Clone, Copy)]
enum Cmd {
    /// Apply the embedded schema migrations
    Migrate,
    /// Scrape cities/routes as configured and load the snapshots
    Catalog,
    /// Fetch OSM bus stops of the configured cities
    Stops,
    /// Stage telemetry for every pending date without loading it
    Fetch,
    /// Load staged telemetry
    Load {
        /// Load dates even when some of their routes are not staged
        #[arg(long)]
        allow_partial: bool,
    },
    /// Migrate if needed, refresh the catalog if flagged, fetch, then load (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (mut config, report) = load_config_path(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;
    debug!("config normalization: {report:?}");

    let cmd = cli.cmd.unwrap_or(Cmd::Run);
    if let Cmd::Load {
        allow_partial: true,
    } = cmd
    {
        config.allow_partial = true;
    }
    let url = config.db.url()?;
    let clock = RunClock::now(config.timezone);
    let store = StagingStore::new(&config.temp_folder);

    match cmd {
        Cmd::Migrate => migrate::run_all(url.expose_secret())?,
        Cmd::Catalog => {
            let mut repo = open_repo(&url)?;
            catalog(&config, &mut repo, &store, clock, true).await?;
        }
        Cmd::Stops => {
            let mut repo = open_repo(&url)?;
            let osm = OverpassProvider::new(&config.overpass_url, &config.http)?;
            let report = refresh_stops(
                &osm,
                &mut repo,
                &store,
                &config.cities,
                clock.today,
                config.remove_temp,
            )
            .await?;
            info!(
                "stored {} stops, {} cities failed",
                report.stored,
                report.failed.len()
            );
        }
        Cmd::Fetch => {
            let mut repo = open_repo(&url)?;
            let portal = BustimeProvider::new(&config.host, &config.http)?;
            let pipeline = Pipeline::new(&portal, &store, PipelineOptions::from_config(&config), clock);
            let plan = pipeline.plan(&mut repo)?;
            summarize_fetch(&pipeline.fetch(&plan).await);
        }
        Cmd::Load { .. } => {
            let mut repo = open_repo(&url)?;
            let portal = BustimeProvider::new(&config.host, &config.http)?;
            let pipeline = Pipeline::new(&portal, &store, PipelineOptions::from_config(&config), clock);
            let plan = pipeline.plan(&mut repo)?;
            summarize_load(&pipeline.load(&mut repo, &plan)?);
        }
        Cmd::Run => {
            if config.migration_completed {
                debug!("migration_completed is set, skipping migrations");
            } else {
                migrate::run_all(url.expose_secret())?;
            }
            let mut repo = open_repo(&url)?;
            catalog(&config, &mut repo, &store, clock, false).await?;

            let portal = BustimeProvider::new(&config.host, &config.http)?;
            let pipeline = Pipeline::new(&portal, &store, PipelineOptions::from_config(&config), clock);
            let report = pipeline.run(&mut repo).await?;
            summarize_fetch(&report.fetch);
            summarize_load(&report.load);
        }
    }

    Ok(())
}

fn open_repo(url: &SecretString) -> Result<PgCatalogRepo> {
    Ok(PgCatalogRepo::new(connection::connect_pg(url.expose_secret())?))
}

/// Catalog refresh; `always` loads leftover snapshots even when no update flag is set.
async fn catalog(
    config: &AppConfig,
    repo: &mut PgCatalogRepo,
    store: &StagingStore,
    clock: RunClock,
    always: bool,
) -> Result<()> {
    if !always && !config.update_cities && !config.update_routes {
        return Ok(());
    }
    let portal = BustimeProvider::new(&config.host, &config.http)?;
    let opts = CatalogRefresh {
        update_cities: config.update_cities,
        update_routes: config.update_routes,
        cities: &config.cities,
        routes_date: config.date.unwrap_or(clock.today),
        today: clock.today,
        remove_temp: config.remove_temp,
    };
    match refresh_catalog(&portal, repo, store, &opts)
        .await
        .context("catalog refresh failed")?
    {
        Some(load) => info!("catalog: {} cities, {} routes", load.cities, load.routes),
        None => info!("catalog: nothing to load"),
    }
    Ok(())
}

fn summarize_fetch(report: &FetchReport) {
    for (unit, e) in &report.failures {
        warn!("pending {unit}: {e}");
    }
    let permanent = report.permanent().count();
    if permanent > 0 {
        warn!("{permanent} pending units failed in a way a rerun is unlikely to fix");
    }
    info!(
        "fetch: {} fetched, {} skipped, {} pending",
        report.count(UnitState::Fetched),
        report.count(UnitState::Skipped),
        report.count(UnitState::Pending)
    );
}

fn summarize_load(report: &LoadReport) {
    if let Some(held) = &report.held_back {
        warn!("load held back: {held}");
    }
    if let Some((date, e)) = &report.failed {
        warn!("load stopped at {date}: {e}");
    }
    info!(
        "load: {} days, {} rows, {} files outside the catalog, {} rows dropped",
        report.loaded.len(),
        report.rows(),
        report.fk_violations.len(),
        report.rows_out_of_window + report.rows_rejected
    );
}
