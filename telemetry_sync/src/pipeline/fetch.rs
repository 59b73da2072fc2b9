use std::collections::BTreeMap;

use futures::{StreamExt, stream};
use tracing::{debug, error, info, warn};
use transit_ingestor::models::telemetry::TelemetryPoint;

use crate::{
    errors::IngestError,
    pipeline::{FetchPlan, Pipeline, UnitOfWork, UnitState},
};

/// Outcome of the fetch phase.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// State of every planned unit.
    pub states: BTreeMap<UnitOfWork, UnitState>,
    /// Units left `Pending`, with the reason.
    pub failures: Vec<(UnitOfWork, IngestError)>,
}

impl FetchReport {
    /// Units in `state`.
    pub fn count(&self, state: UnitState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    /// Pending units whose failure is not expected to clear on a rerun.
    pub fn permanent(&self) -> impl Iterator<Item = &UnitOfWork> {
        self.failures
            .iter()
            .filter(|(_, e)| !e.is_retryable())
            .map(|(unit, _)| unit)
    }

    fn record(&mut self, unit: UnitOfWork, outcome: Result<UnitState, IngestError>) {
        let state = match outcome {
            Ok(state) => state,
            Err(e) => {
                if e.is_retryable() {
                    warn!("{unit}: fetch failed, retried next run: {e}");
                } else {
                    error!("{unit}: fetch failed, a rerun will likely fail too: {e}");
                }
                self.failures.push((unit.clone(), e));
                UnitState::Pending
            }
        };
        self.states.insert(unit, state);
    }
}

impl Pipeline<'_> {
    /// Stage every planned unit that has no staged file yet.
    ///
    /// Dates are processed in ascending order; the units of one date run
    /// with up to `fetch_concurrency` requests in flight.
    pub async fn fetch(&self, plan: &FetchPlan) -> FetchReport {
        let mut report = FetchReport::default();
        let width = self.options.fetch_concurrency.get();

        for date in &plan.dates {
            let outcomes: Vec<_> = stream::iter(plan.units_for(*date))
                .map(|unit| async move {
                    let outcome = self.fetch_unit(&unit).await;
                    (unit, outcome)
                })
                .buffer_unordered(width)
                .collect()
                .await;

            let before = report.failures.len();
            let total = outcomes.len();
            for (unit, outcome) in outcomes {
                report.record(unit, outcome);
            }
            info!(
                "{date}: {total} units, {} failed",
                report.failures.len() - before
            );
        }

        info!(
            "fetch done: {} fetched, {} skipped, {} pending",
            report.count(UnitState::Fetched),
            report.count(UnitState::Skipped),
            report.count(UnitState::Pending)
        );
        report
    }

    async fn fetch_unit(&self, unit: &UnitOfWork) -> Result<UnitState, IngestError> {
        if self.store.exists(unit.date, &unit.city, unit.route_id) {
            debug!("{unit}: already staged");
            return Ok(UnitState::Skipped);
        }

        let records = self
            .source
            .fetch_telemetry(unit.date, &unit.city, unit.route_id)
            .await?;
        let points: Vec<TelemetryPoint> = records
            .into_iter()
            .map(|r| r.stamp(unit.date, unit.route_id, self.clock.started))
            .collect();
        self.store
            .write(unit.date, &unit.city, unit.route_id, &points)?;
        debug!("{unit}: staged {} points", points.len());
        Ok(UnitState::Fetched)
    }
}
