//! Catalog subsystem.
//!
//! The catalog is the relational side of the workspace: cities, routes,
//! bus stops and the day-partitioned telemetry table. [`CatalogRepo`] is the
//! seam the pipeline talks to; [`repo::PgCatalogRepo`] implements it on
//! PostgreSQL. [`refresh`] rebuilds the city/route/stop tables from the
//! remote sources through staged snapshots.

pub mod refresh;
pub mod repo;

use chrono::{Days, NaiveDate};
use transit_ingestor::models::{
    city::City,
    route::{Route, RouteId},
    stop::Stop,
    telemetry::TelemetryPoint,
};

use crate::{errors::IngestError, pipeline::INITIAL_LOOKBACK_DAYS};

/// What [`CatalogRepo::upsert_catalog`] wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogLoad {
    /// Cities inserted.
    pub cities: usize,
    /// Routes inserted.
    pub routes: usize,
    /// Routes dropped because their city is unknown or their id repeats.
    pub routes_dropped: usize,
}

/// Read/write access to the relational store.
///
/// Methods take `&mut self` because a repository owns one connection.
pub trait CatalogRepo {
    /// All cities, ordered by name.
    fn list_cities(&mut self) -> Result<Vec<City>, IngestError>;

    /// `(city name, route id)` for every route, ordered by city then route.
    fn list_routes(&mut self) -> Result<Vec<(String, RouteId)>, IngestError>;

    /// Calendar date of the newest loaded telemetry sample, if any.
    fn latest_loaded_date(&mut self) -> Result<Option<NaiveDate>, IngestError>;

    /// `coalesce(latest_loaded_date, today - INITIAL_LOOKBACK_DAYS)`.
    fn max_telemetry_date(&mut self, today: NaiveDate) -> Result<NaiveDate, IngestError> {
        Ok(match self.latest_loaded_date()? {
            Some(date) => date,
            None => today
                .checked_sub_days(Days::new(INITIAL_LOOKBACK_DAYS))
                .unwrap_or(NaiveDate::MIN),
        })
    }

    /// Replace cities and routes with the given snapshot, in one transaction.
    fn upsert_catalog(&mut self, cities: &[City], routes: &[Route]) -> Result<CatalogLoad, IngestError>;

    /// Create the `[date, date + 1)` partition unless it exists.
    fn ensure_partition(&mut self, date: NaiveDate) -> Result<(), IngestError>;

    /// Bulk-append rows already filtered to one day. Returns rows written.
    fn append_telemetry(&mut self, rows: &[TelemetryPoint]) -> Result<usize, IngestError>;

    /// Ensure the partition, replace the day's rows with `rows`, atomically.
    fn load_day(&mut self, date: NaiveDate, rows: &[TelemetryPoint]) -> Result<usize, IngestError>;

    /// Insert or update bus stops by OSM id. Returns rows written.
    fn upsert_stops(&mut self, stops: &[Stop]) -> Result<usize, IngestError>;
}
