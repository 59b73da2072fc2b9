use chrono::NaiveDate;
use serde::Serialize;

use crate::models::route::RouteId;

/// Form body of the telemetry endpoint.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TelemetryForm {
    pub city_slug: String,
    pub bus_id: RouteId,
    /// `YYYY-MM-DD`
    pub day: String,
}

impl TelemetryForm {
    pub fn new(city: &str, route_id: RouteId, date: NaiveDate) -> Self {
        Self {
            city_slug: city.to_string(),
            bus_id: route_id,
            day: date.format("%Y-%m-%d").to_string(),
        }
    }
}
