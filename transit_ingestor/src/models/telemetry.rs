//! Vehicle telemetry samples.
//!
//! The portal reports only a time of day per sample; the calendar date comes
//! from the request. [`TelemetryRecord`] is the sample as received,
//! [`TelemetryPoint`] the fully stamped row that is staged and loaded.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{io::csv::CsvRecord, models::route::RouteId};

/// One sample as returned by the portal for a (date, city, route) request.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Local time of day of the sample.
    pub time: NaiveTime,
    /// Vehicle identifier (up to 8 characters).
    pub uniqueid: String,
    pub heading: Option<i32>,
    pub speed: Option<i32>,
    pub lon: f64,
    pub lat: f64,
    pub direction: Option<i32>,
    /// Licence plate number.
    pub gosnum: Option<String>,
    /// Fleet (board) number.
    pub bortnum: Option<String>,
    /// Odometer reading.
    pub probeg: Option<i32>,
}

impl TelemetryRecord {
    /// Attaches the request date, the route and the processing instant.
    pub fn stamp(self, date: NaiveDate, route_id: RouteId, upload_date: NaiveDateTime) -> TelemetryPoint {
        TelemetryPoint {
            uniqueid: self.uniqueid,
            timestamp: date.and_time(self.time),
            bus_id: i64::from(route_id),
            heading: self.heading,
            speed: self.speed,
            lon: self.lon,
            lat: self.lat,
            direction: self.direction,
            gosnum: self.gosnum,
            bortnum: self.bortnum,
            probeg: self.probeg,
            upload_date,
        }
    }
}

/// A telemetry row in staging and in the `telemetry` table.
///
/// Field order is the staged CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub uniqueid: String,
    pub timestamp: NaiveDateTime,
    /// Route id (named after the portal's form field).
    pub bus_id: i64,
    pub heading: Option<i32>,
    pub speed: Option<i32>,
    pub lon: f64,
    pub lat: f64,
    pub direction: Option<i32>,
    pub gosnum: Option<String>,
    pub bortnum: Option<String>,
    pub probeg: Option<i32>,
    pub upload_date: NaiveDateTime,
}

impl TelemetryPoint {
    /// True when the sample falls in the one-day window `[date, date + 1)`.
    pub fn within_day(&self, date: NaiveDate) -> bool {
        self.timestamp.date() == date
    }
}

impl CsvRecord for TelemetryPoint {
    const HEADER: &'static [&'static str] = &[
        "uniqueid",
        "timestamp",
        "bus_id",
        "heading",
        "speed",
        "lon",
        "lat",
        "direction",
        "gosnum",
        "bortnum",
        "probeg",
        "upload_date",
    ];
}
