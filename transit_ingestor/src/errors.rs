use thiserror::Error;

use crate::{io::csv::CsvError, providers::ProviderError};

/// The unified error type for the `transit_ingestor` crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An error originating from a data provider (network, HTTP status, parsing).
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// An error while serializing records to CSV.
    #[error("Sink error: {0}")]
    Sink(#[from] CsvError),

    /// An error related to configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
