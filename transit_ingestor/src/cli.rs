//! Command-line surface of the `transit-ingestor` debugging binary.

pub mod commands;
