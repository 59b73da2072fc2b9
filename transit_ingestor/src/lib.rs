//! Remote data sources for public transit data.
//!
//! - [`providers::bustime`] talks to the transit portal (city list, route
//!   lists, per-route vehicle telemetry).
//! - [`providers::overpass`] queries an OSM interpreter for bus stops.
//! - [`retry`] wraps every HTTP call with bounded retries, timeouts and a
//!   client-side rate limit.
//! - [`io::csv`] serializes the canonical models to delimited text.

#[cfg(feature = "cli")]
pub mod cli;
pub mod errors;
pub mod io;
pub mod models;
pub mod providers;
pub mod retry;
