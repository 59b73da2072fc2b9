//! Bus stops from OpenStreetMap.

use serde::{Deserialize, Serialize};

use crate::{io::csv::CsvRecord, models::city::CityId};

/// A `highway=bus_stop` node inside a city's area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// OSM node id.
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    /// EPSG code of the WGS 84 / UTM (north) zone covering the city.
    pub utm: i32,
    pub name: Option<String>,
    pub city_id: CityId,
}

impl CsvRecord for Stop {
    const HEADER: &'static [&'static str] = &["id", "lat", "lon", "utm", "name", "city_id"];
}

/// EPSG code of the northern UTM zone containing `lon`.
///
/// Callers pass the mean longitude of a city's stops so all stops of one
/// city share a projection.
pub fn utm_epsg(lon: f64) -> i32 {
    32600 + ((lon + 186.0) / 6.0).floor() as i32
}
