//! Provider abstraction for remote transit data.
//!
//! [`TransitSource`] is the unified interface the ingestion pipeline uses to
//! reach the transit portal: the city catalog, the routes of one city, and
//! the telemetry of one route on one day. [`StopSource`] covers bus stops
//! from an OSM interpreter.
//!
//! Both traits are async and object-safe (`dyn TransitSource`), so tests and
//! alternative portals can swap the implementation at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use chrono::NaiveDate;
//! use transit_ingestor::models::{
//!     city::City,
//!     route::{Route, RouteId},
//!     telemetry::TelemetryRecord,
//! };
//! use transit_ingestor::providers::{ProviderError, TransitSource};
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl TransitSource for Offline {
//!     async fn fetch_catalog(&self) -> Result<Vec<City>, ProviderError> {
//!         Ok(vec![City::new("kazan")])
//!     }
//!     async fn fetch_routes(&self, _city: &City, _date: NaiveDate) -> Result<Vec<Route>, ProviderError> {
//!         Ok(vec![])
//!     }
//!     async fn fetch_telemetry(
//!         &self,
//!         _date: NaiveDate,
//!         _city: &str,
//!         _route_id: RouteId,
//!     ) -> Result<Vec<TelemetryRecord>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod bustime;
pub mod overpass;

use async_trait::async_trait;
use chrono::NaiveDate;
use snafu::{Backtrace, Snafu};

use crate::models::{
    city::City,
    route::{Route, RouteId},
    stop::Stop,
    telemetry::TelemetryRecord,
};

/// Access to the transit portal.
#[async_trait]
pub trait TransitSource: Send + Sync {
    /// Lists all cities served by the portal.
    async fn fetch_catalog(&self) -> Result<Vec<City>, ProviderError>;

    /// Lists the routes of `city` as shown for `date`.
    async fn fetch_routes(&self, city: &City, date: NaiveDate) -> Result<Vec<Route>, ProviderError>;

    /// Fetches the raw telemetry of one route on one day. May be empty.
    async fn fetch_telemetry(
        &self,
        date: NaiveDate,
        city: &str,
        route_id: RouteId,
    ) -> Result<Vec<TelemetryRecord>, ProviderError>;
}

/// Access to bus stop locations.
#[async_trait]
pub trait StopSource: Send + Sync {
    async fn fetch_stops(&self, city: &City) -> Result<Vec<Stop>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// A default header contains invalid characters.
    #[snafu(display("Invalid header value: {source}"))]
    InvalidHeader {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },

    /// The configured base URL is not an http(s) URL.
    #[snafu(display("Invalid host: {host:?}"))]
    InvalidHost { host: String, backtrace: Backtrace },
}

/// Errors that can occur within a provider implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// Network failure or timeout, after retries were exhausted.
    #[snafu(display("API request failed: {source}"))]
    Request {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The server answered with an error status, after retries were exhausted.
    #[snafu(display("HTTP {status} from {url}"))]
    Status {
        status: u16,
        url: String,
        backtrace: Backtrace,
    },

    /// The response did not have the expected HTML/JSON shape.
    #[snafu(display("Unexpected response: {message}"))]
    Parse {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl ProviderError {
    /// Network-level failures that may succeed on a later run.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request { .. } => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Parse { .. } | ProviderError::Init { .. } => false,
        }
    }
}

impl From<ProviderInitError> for ProviderError {
    fn from(source: ProviderInitError) -> Self {
        ProviderError::Init { source }
    }
}

/// Validates and normalizes a base URL (no trailing slash).
pub(crate) fn normalize_host(host: &str) -> Result<String, ProviderInitError> {
    let trimmed = host.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return InvalidHostSnafu { host }.fail();
    }
    Ok(trimmed.to_string())
}
