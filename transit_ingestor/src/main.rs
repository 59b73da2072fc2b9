use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use transit_ingestor::{
    cli::commands::{Cli, Commands},
    errors::Error,
    io::csv::write_rows,
    models::city::City,
    providers::{
        StopSource, TransitSource, bustime::BustimeProvider, overpass::OverpassProvider,
    },
    retry::{HttpSettings, RetryPolicy},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let tz: Tz = cli.timezone.trim().parse().map_err(config_err)?;
    let settings = HttpSettings {
        retry: RetryPolicy {
            max_retries: cli.max_retries,
            max_body_retries: cli.max_body_retries,
            base_delay: Duration::from_millis(cli.base_delay_ms),
        },
        ..HttpSettings::default()
    };
    let stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Cities => {
            let portal = BustimeProvider::new(&cli.host, &settings).map_err(config_err)?;
            let cities = portal.fetch_catalog().await?;
            write_rows(stdout, &cities)?;
        }
        Commands::Routes { city, date } => {
            let portal = BustimeProvider::new(&cli.host, &settings).map_err(config_err)?;
            let date = date.unwrap_or_else(|| Utc::now().with_timezone(&tz).date_naive());
            let routes = portal.fetch_routes(&City::new(city), date).await?;
            write_rows(stdout, &routes)?;
        }
        Commands::Telemetry { city, route, date } => {
            let portal = BustimeProvider::new(&cli.host, &settings).map_err(config_err)?;
            let uploaded = Utc::now().naive_utc();
            let points: Vec<_> = portal
                .fetch_telemetry(date, &city, route)
                .await?
                .into_iter()
                .map(|r| r.stamp(date, route, uploaded))
                .collect();
            write_rows(stdout, &points)?;
        }
        Commands::Stops { city } => {
            let osm = OverpassProvider::new(&cli.overpass_url, &settings).map_err(config_err)?;
            let stops = osm.fetch_stops(&City::new(city)).await?;
            write_rows(stdout, &stops)?;
        }
    }

    Ok(())
}

fn config_err(e: impl std::fmt::Display) -> Error {
    Error::Config(e.to_string())
}
