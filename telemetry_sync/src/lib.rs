//! Incremental ingestion of transit telemetry into PostgreSQL.
//!
//! - [`staging`]: the local staging store of fetched files
//! - [`catalog`]: the relational catalog (cities, routes, stops, telemetry partitions)
//! - [`pipeline`]: fetch → stage → partition → load, resuming from the last loaded day
//! - [`config`]: the run configuration

#![deny(missing_docs)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod partition;
pub mod pipeline;
#[allow(missing_docs)]
pub mod schema;
pub mod staging;
pub mod tz;
