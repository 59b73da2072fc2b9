//! Diesel models mapping to the `transport` schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::telemetry`]: partitioned vehicle samples
//! - catalog tables (`cities`, `routes`, `stops`) live in [`catalog`]
//!
//! Rows borrow from the provider models in `transit_ingestor` so that bulk
//! inserts do not copy strings.

pub mod catalog;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use transit_ingestor::models::telemetry::TelemetryPoint;

use crate::schema::telemetry;

/// Width of the `telemetry.uniqueid` column, in characters.
pub const UNIQUEID_MAX_CHARS: usize = 8;

/// A row of [`crate::schema::telemetry`] as read back from the database.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = telemetry, check_for_backend(diesel::pg::Pg))]
pub struct TelemetryRow {
    /// Vehicle identifier.
    pub uniqueid: String,
    /// Sample instant, local time of the portal.
    pub timestamp: NaiveDateTime,
    /// Route id.
    pub bus_id: i64,
    /// Heading in degrees.
    pub heading: Option<i32>,
    /// Speed in km/h.
    pub speed: Option<i32>,
    /// Longitude (WGS 84).
    pub lon: f64,
    /// Latitude (WGS 84).
    pub lat: f64,
    /// Direction flag as reported by the portal.
    pub direction: Option<i32>,
    /// Licence plate number.
    pub gosnum: Option<String>,
    /// Fleet number.
    pub bortnum: Option<String>,
    /// Odometer reading.
    pub probeg: Option<i32>,
    /// When the sample was fetched.
    pub upload_date: NaiveDateTime,
}

/// Insertable form of [`TelemetryRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = telemetry)]
pub struct NewTelemetry<'a> {
    /// Vehicle identifier.
    pub uniqueid: &'a str,
    /// Sample instant.
    pub timestamp: NaiveDateTime,
    /// Route id.
    pub bus_id: i64,
    /// Heading in degrees.
    pub heading: Option<i32>,
    /// Speed in km/h.
    pub speed: Option<i32>,
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
    /// Direction flag.
    pub direction: Option<i32>,
    /// Licence plate number.
    pub gosnum: Option<&'a str>,
    /// Fleet number.
    pub bortnum: Option<&'a str>,
    /// Odometer reading.
    pub probeg: Option<i32>,
    /// When the sample was fetched.
    pub upload_date: NaiveDateTime,
}

impl<'a> From<&'a TelemetryPoint> for NewTelemetry<'a> {
    fn from(p: &'a TelemetryPoint) -> Self {
        Self {
            uniqueid: &p.uniqueid,
            timestamp: p.timestamp,
            bus_id: p.bus_id,
            heading: p.heading,
            speed: p.speed,
            lon: p.lon,
            lat: p.lat,
            direction: p.direction,
            gosnum: p.gosnum.as_deref(),
            bortnum: p.bortnum.as_deref(),
            probeg: p.probeg,
            upload_date: p.upload_date,
        }
    }
}

/// Number of bind parameters one [`NewTelemetry`] row uses.
pub const TELEMETRY_COLUMNS: usize = 12;
