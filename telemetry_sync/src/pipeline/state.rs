//! Units of work and their states.

use std::fmt;

use chrono::NaiveDate;
use transit_ingestor::models::route::RouteId;

/// One (date, city, route) fetch/load task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitOfWork {
    /// Service day.
    pub date: NaiveDate,
    /// City slug.
    pub city: String,
    /// Route id.
    pub route_id: RouteId,
}

impl UnitOfWork {
    /// Build a unit.
    pub fn new(date: NaiveDate, city: impl Into<String>, route_id: RouteId) -> Self {
        Self {
            date,
            city: city.into(),
            route_id,
        }
    }
}

impl fmt::Display for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.date, self.city, self.route_id)
    }
}

/// Lifecycle of a unit: `Pending → Fetched → Loaded`, or `Skipped` when a
/// staged file already existed.
///
/// A failed fetch leaves the unit `Pending`; the next run retries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Not staged yet.
    Pending,
    /// Staged by this run.
    Fetched,
    /// Staged by an earlier run; no network call made.
    Skipped,
    /// Its date was appended to the telemetry table.
    Loaded,
}

impl UnitState {
    /// True once the unit has a staged file.
    pub fn is_staged(self) -> bool {
        matches!(self, UnitState::Fetched | UnitState::Skipped)
    }

    /// Transition after the unit's date was loaded. Pending units stay pending.
    pub fn after_load(self) -> Self {
        if self.is_staged() {
            UnitState::Loaded
        } else {
            self
        }
    }
}
