#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    num::NonZeroUsize,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tempfile::TempDir;
use telemetry_sync::{
    catalog::{CatalogLoad, CatalogRepo, repo::filter_routes},
    errors::IngestError,
    pipeline::{PipelineOptions, RunClock},
    staging::StagingStore,
};
use transit_ingestor::{
    models::{
        city::City,
        route::{Route, RouteId},
        stop::Stop,
        telemetry::{TelemetryPoint, TelemetryRecord},
    },
    providers::{ProviderError, StatusSnafu, StopSource, TransitSource},
};

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, s).unwrap()
}

/// A run "now": today at 03:00.
pub fn clock(today: NaiveDate) -> RunClock {
    RunClock {
        today,
        started: at(today, 3, 0, 0),
    }
}

pub fn options(cities: &[&str]) -> PipelineOptions {
    PipelineOptions {
        cities: cities.iter().map(|c| c.to_string()).collect(),
        fetch_concurrency: NonZeroUsize::MIN,
        allow_partial: false,
        remove_temp: false,
    }
}

pub fn record(h: u32, m: u32, s: u32, uniqueid: &str) -> TelemetryRecord {
    TelemetryRecord {
        time: NaiveTime::from_hms_opt(h, m, s).unwrap(),
        uniqueid: uniqueid.to_string(),
        heading: Some(90),
        speed: Some(25),
        lon: 49.1221,
        lat: 55.7887,
        direction: Some(0),
        gosnum: Some("а123вс".into()),
        bortnum: Some("1042".into()),
        probeg: Some(120_000),
    }
}

pub fn point(ts: NaiveDateTime, route_id: RouteId) -> TelemetryPoint {
    let mut p = record(0, 0, 0, "seed0001").stamp(ts.date(), route_id, ts);
    p.timestamp = ts;
    p
}

/// Staging root that lives as long as the test.
pub struct TestStaging {
    _dir: TempDir,
    pub store: StagingStore,
}

pub fn setup_staging() -> TestStaging {
    let dir = TempDir::new().expect("tempdir");
    let store = StagingStore::new(dir.path());
    TestStaging { _dir: dir, store }
}

type UnitKey = (NaiveDate, String, RouteId);

/// Scripted portal that counts calls.
#[derive(Default)]
pub struct FakeSource {
    pub cities: Vec<City>,
    pub routes: HashMap<String, Vec<Route>>,
    pub telemetry: HashMap<UnitKey, Vec<TelemetryRecord>>,
    pub failing: Mutex<HashSet<UnitKey>>,
    pub gone: HashSet<UnitKey>,
    pub telemetry_calls: AtomicUsize,
    pub catalog_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_telemetry(
        mut self,
        date: NaiveDate,
        city: &str,
        route_id: RouteId,
        records: Vec<TelemetryRecord>,
    ) -> Self {
        self.telemetry.insert((date, city.to_string(), route_id), records);
        self
    }

    pub fn fail(&self, date: NaiveDate, city: &str, route_id: RouteId) {
        self.failing
            .lock()
            .unwrap()
            .insert((date, city.to_string(), route_id));
    }

    /// The portal answers 404 for this unit on every call.
    pub fn without(mut self, date: NaiveDate, city: &str, route_id: RouteId) -> Self {
        self.gone.insert((date, city.to_string(), route_id));
        self
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn telemetry_calls(&self) -> usize {
        self.telemetry_calls.load(Ordering::SeqCst)
    }
}

fn unavailable() -> ProviderError {
    StatusSnafu {
        status: 503u16,
        url: "http://fake/ajax/transport/",
    }
    .build()
}

#[async_trait]
impl TransitSource for FakeSource {
    async fn fetch_catalog(&self) -> Result<Vec<City>, ProviderError> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cities.clone())
    }

    async fn fetch_routes(&self, city: &City, _date: NaiveDate) -> Result<Vec<Route>, ProviderError> {
        Ok(self.routes.get(&city.name).cloned().unwrap_or_default())
    }

    async fn fetch_telemetry(
        &self,
        date: NaiveDate,
        city: &str,
        route_id: RouteId,
    ) -> Result<Vec<TelemetryRecord>, ProviderError> {
        self.telemetry_calls.fetch_add(1, Ordering::SeqCst);
        let key = (date, city.to_string(), route_id);
        if self.failing.lock().unwrap().contains(&key) {
            return Err(unavailable());
        }
        if self.gone.contains(&key) {
            return Err(StatusSnafu {
                status: 404u16,
                url: "http://fake/ajax/transport/",
            }
            .build());
        }
        Ok(self.telemetry.get(&key).cloned().unwrap_or_default())
    }
}

/// Stops per city; cities listed in `failing` answer 503.
#[derive(Default)]
pub struct FakeStops {
    pub stops: HashMap<String, Vec<Stop>>,
    pub failing: HashSet<String>,
}

#[async_trait]
impl StopSource for FakeStops {
    async fn fetch_stops(&self, city: &City) -> Result<Vec<Stop>, ProviderError> {
        if self.failing.contains(&city.name) {
            return Err(unavailable());
        }
        Ok(self.stops.get(&city.name).cloned().unwrap_or_default())
    }
}

/// In-memory catalog with the same semantics as the PostgreSQL repository.
#[derive(Default)]
pub struct MemoryRepo {
    pub cities: Vec<City>,
    pub routes: Vec<Route>,
    pub telemetry: Vec<TelemetryPoint>,
    pub partitions: BTreeSet<NaiveDate>,
    pub stops: BTreeMap<i64, Stop>,
    pub fail_load_on: Option<NaiveDate>,
}

impl MemoryRepo {
    pub fn with_routes(city: &str, routes: &[(RouteId, &str)]) -> Self {
        let city = City::new(city);
        let routes = routes
            .iter()
            .map(|(id, name)| Route::new(*id, *name, city.id))
            .collect();
        Self {
            cities: vec![city],
            routes,
            ..Self::default()
        }
    }

    pub fn rows_on(&self, date: NaiveDate) -> Vec<&TelemetryPoint> {
        self.telemetry.iter().filter(|p| p.within_day(date)).collect()
    }
}

impl CatalogRepo for MemoryRepo {
    fn list_cities(&mut self) -> Result<Vec<City>, IngestError> {
        let mut cities = self.cities.clone();
        cities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cities)
    }

    fn list_routes(&mut self) -> Result<Vec<(String, RouteId)>, IngestError> {
        let names: HashMap<i64, &str> = self.cities.iter().map(|c| (c.id, c.name.as_str())).collect();
        let mut out: Vec<(String, RouteId)> = self
            .routes
            .iter()
            .filter_map(|r| names.get(&r.city_id).map(|n| (n.to_string(), r.id)))
            .collect();
        out.sort();
        Ok(out)
    }

    fn latest_loaded_date(&mut self) -> Result<Option<NaiveDate>, IngestError> {
        Ok(self.telemetry.iter().map(|p| p.timestamp.date()).max())
    }

    fn upsert_catalog(&mut self, cities: &[City], routes: &[Route]) -> Result<CatalogLoad, IngestError> {
        let (kept, routes_dropped) = filter_routes(cities, routes);
        self.routes = kept.into_iter().cloned().collect();
        self.cities = cities.to_vec();
        Ok(CatalogLoad {
            cities: self.cities.len(),
            routes: self.routes.len(),
            routes_dropped,
        })
    }

    fn ensure_partition(&mut self, date: NaiveDate) -> Result<(), IngestError> {
        self.partitions.insert(date);
        Ok(())
    }

    fn append_telemetry(&mut self, rows: &[TelemetryPoint]) -> Result<usize, IngestError> {
        self.telemetry.extend_from_slice(rows);
        Ok(rows.len())
    }

    fn load_day(&mut self, date: NaiveDate, rows: &[TelemetryPoint]) -> Result<usize, IngestError> {
        if self.fail_load_on == Some(date) {
            return Err(IngestError::PartitionConflict {
                date,
                message: "would overlap partition".into(),
            });
        }
        self.ensure_partition(date)?;
        self.telemetry.retain(|p| !p.within_day(date));
        self.append_telemetry(rows)
    }

    fn upsert_stops(&mut self, stops: &[Stop]) -> Result<usize, IngestError> {
        let mut seen = HashSet::new();
        for stop in stops.iter().filter(|s| seen.insert(s.id)) {
            self.stops.insert(stop.id, stop.clone());
        }
        Ok(seen.len())
    }
}
