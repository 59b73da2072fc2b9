//! Small helpers shared by the ingestion crates.

pub mod config;
pub mod env;
