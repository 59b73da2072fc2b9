//! Incremental telemetry ingestion.
//!
//! A run has two phases:
//!
//! 1. **Fetch** ([`Pipeline::fetch`]): for every pending date (ascending) and
//!    every route of a configured city, stage the portal's answer unless a
//!    staged file already exists. Failures are recorded per unit and never
//!    abort the others.
//! 2. **Load** ([`Pipeline::load`]): only after every fetch finished, walk the
//!    staged date folders in ascending order and replace each complete day in
//!    the telemetry table, creating its partition on demand.
//!
//! The run resumes from the newest loaded day, so an interrupted or partially
//! failed run is completed by simply running again.

mod fetch;
mod load;
pub mod state;

use std::{
    collections::{BTreeMap, HashSet},
    num::NonZeroUsize,
};

use chrono::{Days, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::info;
use transit_ingestor::{models::route::RouteId, providers::TransitSource};

pub use fetch::FetchReport;
pub use load::{HeldBack, LoadReport, LoadedDay};
pub use state::{UnitOfWork, UnitState};

use crate::{
    catalog::CatalogRepo,
    config::AppConfig,
    errors::IngestError,
    staging::{StagingStore, next_day},
    tz,
};

/// Days looked back when the telemetry table is empty.
pub const INITIAL_LOOKBACK_DAYS: u64 = 7;

/// The run's notion of "now", captured once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    /// Calendar date in the portal's zone; the last fetched day is the one before.
    pub today: NaiveDate,
    /// Stamped into `upload_date` of every row fetched by this run.
    pub started: NaiveDateTime,
}

impl RunClock {
    /// Current instant seen in `tz`.
    pub fn now(tz: Tz) -> Self {
        let now = Utc::now();
        Self {
            today: tz::date_in(now, tz),
            started: tz::local_naive(now, tz),
        }
    }
}

/// Knobs of the pipeline, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// City slugs whose routes are ingested.
    pub cities: Vec<String>,
    /// Units of one date fetched concurrently.
    pub fetch_concurrency: NonZeroUsize,
    /// Load days even when some of their units are not staged.
    pub allow_partial: bool,
    /// Delete a day's staged folder after it was loaded.
    pub remove_temp: bool,
}

impl PipelineOptions {
    /// Options from the resolved configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cities: config.cities.clone(),
            fetch_concurrency: config.fetch_concurrency,
            allow_partial: config.allow_partial,
            remove_temp: config.remove_temp,
        }
    }
}

/// Routes and dates a run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// `(city, route)` pairs of the configured cities.
    pub routes: Vec<(String, RouteId)>,
    /// First day of the window; earlier staged days count as loaded.
    pub start: NaiveDate,
    /// Pending days, ascending, ending yesterday.
    pub dates: Vec<NaiveDate>,
}

impl FetchPlan {
    /// Every unit expected for `date`.
    pub fn units_for(&self, date: NaiveDate) -> Vec<UnitOfWork> {
        self.routes
            .iter()
            .map(|(city, route_id)| UnitOfWork::new(date, city.as_str(), *route_id))
            .collect()
    }

    /// Number of units over all pending dates.
    pub fn unit_count(&self) -> usize {
        self.routes.len() * self.dates.len()
    }
}

/// Combined outcome of [`Pipeline::run`].
#[derive(Debug)]
pub struct RunReport {
    /// Work the run planned.
    pub plan: FetchPlan,
    /// Fetch phase outcome.
    pub fetch: FetchReport,
    /// Load phase outcome.
    pub load: LoadReport,
}

impl RunReport {
    /// Unit states after both phases.
    pub fn final_states(&self) -> BTreeMap<UnitOfWork, UnitState> {
        let loaded: HashSet<NaiveDate> = self.load.loaded.iter().map(|d| d.date).collect();
        self.fetch
            .states
            .iter()
            .map(|(unit, state)| {
                let state = if loaded.contains(&unit.date) {
                    state.after_load()
                } else {
                    *state
                };
                (unit.clone(), state)
            })
            .collect()
    }
}

/// Orchestrates fetch and load over one staging store.
pub struct Pipeline<'a> {
    source: &'a dyn TransitSource,
    store: &'a StagingStore,
    options: PipelineOptions,
    clock: RunClock,
}

impl<'a> Pipeline<'a> {
    /// Pipeline fetching from `source` into `store`.
    pub fn new(
        source: &'a dyn TransitSource,
        store: &'a StagingStore,
        options: PipelineOptions,
        clock: RunClock,
    ) -> Self {
        Self {
            source,
            store,
            options,
            clock,
        }
    }

    /// The run clock.
    pub fn clock(&self) -> RunClock {
        self.clock
    }

    /// Routes of the configured cities and the pending dates.
    ///
    /// The window starts the day after the newest loaded day, or
    /// [`INITIAL_LOOKBACK_DAYS`] before today when nothing is loaded, and
    /// ends yesterday.
    pub fn plan<R>(&self, repo: &mut R) -> Result<FetchPlan, IngestError>
    where
        R: CatalogRepo + ?Sized,
    {
        let wanted: HashSet<&str> = self.options.cities.iter().map(String::as_str).collect();
        let routes: Vec<(String, RouteId)> = repo
            .list_routes()?
            .into_iter()
            .filter(|(city, _)| wanted.contains(city.as_str()))
            .collect();

        let today = self.clock.today;
        let start = match repo.latest_loaded_date()? {
            Some(latest) => next_day(latest).unwrap_or(latest),
            None => repo.max_telemetry_date(today)?,
        };
        let end = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let dates = StagingStore::list_pending_dates(start, end);

        info!(
            "plan: {} routes in {} cities, {} dates from {start}",
            routes.len(),
            wanted.len(),
            dates.len()
        );
        Ok(FetchPlan {
            routes,
            start,
            dates,
        })
    }

    /// Plan, fetch everything pending, then load what is complete.
    pub async fn run<R>(&self, repo: &mut R) -> Result<RunReport, IngestError>
    where
        R: CatalogRepo + ?Sized,
    {
        let plan = self.plan(repo)?;
        let fetch = self.fetch(&plan).await;
        let load = self.load(repo, &plan)?;
        Ok(RunReport { plan, fetch, load })
    }
}
