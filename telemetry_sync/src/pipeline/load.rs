use std::{
    collections::{BTreeSet, HashSet},
    fmt,
};

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};
use transit_ingestor::models::{route::RouteId, telemetry::TelemetryPoint};

use crate::{
    catalog::CatalogRepo,
    errors::IngestError,
    models::UNIQUEID_MAX_CHARS,
    pipeline::{FetchPlan, Pipeline, UnitOfWork},
    staging::StagedFile,
};

/// A day appended to the telemetry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDay {
    /// The day.
    pub date: NaiveDate,
    /// Staged files that went in.
    pub units: usize,
    /// Rows appended.
    pub rows: usize,
}

/// The first day that could not be loaded because units are missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldBack {
    /// The day; it and every later day wait for the next run.
    pub date: NaiveDate,
    /// Units without a staged file.
    pub missing: Vec<UnitOfWork>,
}

/// Units named in the held-back message before it is abbreviated.
const HELD_BACK_SHOWN: usize = 5;

impl fmt::Display for HeldBack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is missing ", self.date)?;
        for (i, unit) in self.missing.iter().take(HELD_BACK_SHOWN).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{unit}")?;
        }
        if self.missing.len() > HELD_BACK_SHOWN {
            write!(f, " and {} more", self.missing.len() - HELD_BACK_SHOWN)?;
        }
        write!(
            f,
            "; it and later dates wait for them, `telemetry-sync load --allow-partial` loads without them"
        )
    }
}

/// Outcome of the load phase.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Days loaded, ascending.
    pub loaded: Vec<LoadedDay>,
    /// Staged days at or before the newest loaded day, left untouched.
    pub already_loaded: Vec<NaiveDate>,
    /// Set when the pass stopped at an incomplete day.
    pub held_back: Option<HeldBack>,
    /// Set when the pass stopped because a day failed to load.
    pub failed: Option<(NaiveDate, IngestError)>,
    /// Staged files skipped because their route is not in the catalog.
    pub fk_violations: Vec<IngestError>,
    /// Rows dropped because their timestamp is outside their day.
    pub rows_out_of_window: usize,
    /// Rows dropped because their vehicle id does not fit the column.
    pub rows_rejected: usize,
}

impl LoadReport {
    /// Total rows appended.
    pub fn rows(&self) -> usize {
        self.loaded.iter().map(|d| d.rows).sum()
    }
}

impl Pipeline<'_> {
    /// Load staged days in ascending order.
    ///
    /// A day inside the plan's window is loaded only when every expected unit
    /// is staged (or `allow_partial` is set); the first day that is not stops
    /// the pass so the newest loaded day never skips over retryable work.
    /// Staged days before the window cannot be completed by a fetch and are
    /// loaded as they are. A day that fails to load keeps its staged files
    /// and also stops the pass.
    pub fn load<R>(&self, repo: &mut R, plan: &FetchPlan) -> Result<LoadReport, IngestError>
    where
        R: CatalogRepo + ?Sized,
    {
        let mut staged = self.store.staged_dates()?;
        // a planned day whose units all failed has no folder but still blocks later days
        for date in &plan.dates {
            staged.entry(*date).or_default();
        }
        let catalog: HashSet<RouteId> = repo.list_routes()?.into_iter().map(|(_, id)| id).collect();
        let latest = repo.latest_loaded_date()?;
        let mut report = LoadReport::default();

        for (date, files) in staged {
            if latest.is_some_and(|l| date <= l) {
                debug!("{date}: already loaded, skipping");
                report.already_loaded.push(date);
                continue;
            }

            if date >= plan.start {
                let missing = missing_units(plan, date, &files);
                if !missing.is_empty() {
                    if !self.options.allow_partial {
                        let held = HeldBack { date, missing };
                        info!(
                            "{} of {} units not staged: {held}",
                            held.missing.len(),
                            plan.routes.len()
                        );
                        report.held_back = Some(held);
                        break;
                    }
                    warn!("{date}: loading without {} missing units", missing.len());
                }
            } else {
                warn!("{date}: staged before the current window, loading as is");
            }
            if files.is_empty() {
                continue;
            }

            let rows = match self.collect_day(date, &files, &catalog, &mut report) {
                Ok(rows) => rows,
                Err(e) => {
                    error!("{date}: cannot read staged files: {e}");
                    report.failed = Some((date, e));
                    break;
                }
            };

            match repo.load_day(date, &rows) {
                Ok(written) => {
                    info!("{date}: loaded {written} rows from {} files", files.len());
                    report.loaded.push(LoadedDay {
                        date,
                        units: files.len(),
                        rows: written,
                    });
                    if self.options.remove_temp {
                        if let Err(e) = self.store.remove_date(date) {
                            warn!("{date}: loaded but staged files not removed: {e}");
                        }
                    }
                }
                Err(e) => {
                    error!("{date}: load failed, staged files kept: {e}");
                    report.failed = Some((date, e));
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Rows of one day's staged files that pass the FK and window checks.
    fn collect_day(
        &self,
        date: NaiveDate,
        files: &[StagedFile],
        catalog: &HashSet<RouteId>,
        report: &mut LoadReport,
    ) -> Result<Vec<TelemetryPoint>, IngestError> {
        let mut rows = Vec::new();
        for file in files {
            if !catalog.contains(&file.route_id) {
                let violation = IngestError::ForeignKeyViolation {
                    city: file.city.clone(),
                    route_id: file.route_id,
                };
                warn!("{date}: skipping {}: {violation}", file.path.display());
                report.fk_violations.push(violation);
                continue;
            }

            let len_before = rows.len();
            let points = self.store.read(&file.path)?;
            let before = points.len();
            let (kept, outside): (Vec<TelemetryPoint>, Vec<TelemetryPoint>) =
                points.into_iter().partition(|p| p.within_day(date));
            if !outside.is_empty() {
                warn!(
                    "{date}: {} rows of {} fall outside the day",
                    outside.len(),
                    file.path.display()
                );
                report.rows_out_of_window += outside.len();
            }
            rows.extend(
                kept.into_iter()
                    .filter(|p| p.uniqueid.chars().count() <= UNIQUEID_MAX_CHARS),
            );
            let rejected = before - outside.len() - (rows.len() - len_before);
            if rejected > 0 {
                warn!(
                    "{date}: {rejected} rows of {} have a vehicle id over {UNIQUEID_MAX_CHARS} chars",
                    file.path.display()
                );
                report.rows_rejected += rejected;
            }
        }
        Ok(rows)
    }
}

/// Planned units of `date` without a staged file.
fn missing_units(plan: &FetchPlan, date: NaiveDate, files: &[StagedFile]) -> Vec<UnitOfWork> {
    let staged: BTreeSet<(&str, RouteId)> = files
        .iter()
        .map(|f| (f.city.as_str(), f.route_id))
        .collect();
    plan.units_for(date)
        .into_iter()
        .filter(|u| !staged.contains(&(u.city.as_str(), u.route_id)))
        .collect()
}
