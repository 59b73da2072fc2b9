use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::providers::{bustime::DEFAULT_HOST, overpass::DEFAULT_INTERPRETER_URL};

#[derive(Parser)]
#[command(author, version, about = "Single remote calls against the transit portal, printed as CSV")]
pub struct Cli {
    /// Base URL of the transit portal
    #[arg(long, env = "TRANSIT_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// OSM interpreter endpoint
    #[arg(long, default_value = DEFAULT_INTERPRETER_URL)]
    pub overpass_url: String,

    /// Maximum number of retries for failed requests
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Re-fetches of a response body that does not decode
    #[arg(long, default_value = "3")]
    pub max_body_retries: u32,

    #[arg(long, default_value = "1000")]
    pub base_delay_ms: u64,

    /// IANA zone of the portal, used for the default `routes --date`
    #[arg(long, env = "TRANSIT_TZ", default_value = "Europe/Moscow")]
    pub timezone: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all cities with their derived ids
    Cities,

    /// List the routes of one city
    Routes {
        /// City slug (e.g. "kazan")
        #[arg(long)]
        city: String,

        /// Date of the route page, YYYY-MM-DD (defaults to today in `--timezone`)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Fetch one route's telemetry for one day
    Telemetry {
        #[arg(long)]
        city: String,

        /// Route id as listed by `routes`
        #[arg(long)]
        route: i32,

        /// Day to fetch, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },

    /// List bus stops of one city from OpenStreetMap
    Stops {
        #[arg(long)]
        city: String,
    },
}
