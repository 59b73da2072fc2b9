use async_trait::async_trait;
use chrono::NaiveDate;
use shared_utils::env::get_env_var_opt;
use tracing::{debug, warn};

use crate::{
    models::{
        city::City,
        route::{Route, RouteId},
        telemetry::TelemetryRecord,
    },
    providers::{
        ProviderError, ProviderInitError, TransitSource,
        bustime::{
            html::{parse_city_slugs, parse_route_options},
            params::TelemetryForm,
            response::BustimeResponse,
        },
        normalize_host,
    },
    retry::{HttpSettings, RetryingClient},
};

pub const DEFAULT_HOST: &str = "https://www.bustime.ru";

/// Client for the transit portal.
#[derive(Clone)]
pub struct BustimeProvider {
    http: RetryingClient,
    host: String,
}

impl BustimeProvider {
    /// Creates a provider for `host` (e.g. [`DEFAULT_HOST`]).
    pub fn new(host: &str, settings: &HttpSettings) -> Result<Self, ProviderInitError> {
        Ok(Self {
            http: RetryingClient::new(settings)?,
            host: normalize_host(host)?,
        })
    }

    /// Creates a provider from the `TRANSIT_HOST` environment variable,
    /// falling back to [`DEFAULT_HOST`].
    pub fn from_env() -> Result<Self, ProviderInitError> {
        let host = get_env_var_opt("TRANSIT_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        Self::new(&host, &HttpSettings::default())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn routes_url(&self, city: &str, date: NaiveDate) -> String {
        format!("{}/{}/transport/{}", self.host, city, date.format("%Y-%m-%d"))
    }

    fn telemetry_url(&self) -> String {
        format!("{}/ajax/transport/", self.host)
    }
}

#[async_trait]
impl TransitSource for BustimeProvider {
    async fn fetch_catalog(&self) -> Result<Vec<City>, ProviderError> {
        let url = format!("{}/", self.host);
        let body = self.http.text(|c| c.get(&url)).await?;
        let cities: Vec<City> = parse_city_slugs(&body)?.into_iter().map(City::new).collect();
        debug!("catalog lists {} cities", cities.len());
        Ok(cities)
    }

    async fn fetch_routes(&self, city: &City, date: NaiveDate) -> Result<Vec<Route>, ProviderError> {
        let url = self.routes_url(&city.name, date);
        let body = self.http.text(|c| c.get(&url)).await?;
        let routes: Vec<Route> = parse_route_options(&body)?
            .into_iter()
            .map(|(id, name)| Route::new(id, name, city.id))
            .collect();
        debug!("{} lists {} routes", city.name, routes.len());
        Ok(routes)
    }

    async fn fetch_telemetry(
        &self,
        date: NaiveDate,
        city: &str,
        route_id: RouteId,
    ) -> Result<Vec<TelemetryRecord>, ProviderError> {
        let url = self.telemetry_url();
        let form = TelemetryForm::new(city, route_id, date);
        let points: BustimeResponse = self.http.json(|c| c.post(&url).form(&form)).await?;

        let mut out = Vec::new();
        let mut rejected = 0usize;
        for point in points.unwrap_or_default() {
            match TelemetryRecord::try_from(point) {
                Ok(rec) => out.push(rec),
                Err(reason) => {
                    rejected += 1;
                    debug!("{city}/{route_id}/{date}: dropping point: {reason}");
                }
            }
        }
        if rejected > 0 {
            warn!("{city}/{route_id}/{date}: dropped {rejected} malformed points");
        }
        Ok(out)
    }
}
