use async_trait::async_trait;
use tracing::debug;

use crate::{
    models::{
        city::City,
        stop::{Stop, utm_epsg},
    },
    providers::{
        ProviderError, ProviderInitError, StopSource, normalize_host,
        overpass::response::{OverpassElement, OverpassResponse},
    },
    retry::{HttpSettings, RetryingClient},
};

pub const DEFAULT_INTERPRETER_URL: &str = "http://overpass-api.de/api/interpreter";

/// Client for an Overpass-compatible OSM interpreter.
#[derive(Clone)]
pub struct OverpassProvider {
    http: RetryingClient,
    url: String,
}

impl OverpassProvider {
    pub fn new(url: &str, settings: &HttpSettings) -> Result<Self, ProviderInitError> {
        Ok(Self {
            http: RetryingClient::new(settings)?,
            url: normalize_host(url)?,
        })
    }
}

/// `kazan` -> `Kazan`, matching the English `name:en` tag of the city area.
fn area_name(slug: &str) -> String {
    let mut chars = slug.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Overpass QL selecting bus stop nodes inside the city area.
pub fn bus_stop_query(slug: &str) -> String {
    format!(
        "[out:json];\narea[\"name:en\"=\"{}\"];\nnode[highway=bus_stop](area);\nout body qt;",
        area_name(slug)
    )
}

/// Converts nodes to stops; all stops of the batch share the UTM zone of
/// their mean longitude.
fn to_stops(elements: Vec<OverpassElement>, city: &City) -> Vec<Stop> {
    let nodes: Vec<(i64, f64, f64, Option<String>)> = elements
        .into_iter()
        .filter(|e| e.kind.is_empty() || e.kind == "node")
        .filter_map(|mut e| {
            let name = e.tags.remove("name");
            Some((e.id, e.lat?, e.lon?, name))
        })
        .collect();
    if nodes.is_empty() {
        return Vec::new();
    }
    let mean_lon = nodes.iter().map(|n| n.2).sum::<f64>() / nodes.len() as f64;
    let utm = utm_epsg(mean_lon);
    nodes
        .into_iter()
        .map(|(id, lat, lon, name)| Stop {
            id,
            lat,
            lon,
            utm,
            name,
            city_id: city.id,
        })
        .collect()
}

#[async_trait]
impl StopSource for OverpassProvider {
    async fn fetch_stops(&self, city: &City) -> Result<Vec<Stop>, ProviderError> {
        let query = bus_stop_query(&city.name);
        let resp: OverpassResponse = self
            .http
            .json(|c| c.get(&self.url).query(&[("data", query.as_str())]))
            .await?;
        let stops = to_stops(resp.elements, city);
        debug!("{}: {} bus stops", city.name, stops.len());
        Ok(stops)
    }
}
