//! Error taxonomy of the ingestion workspace.
//!
//! Fetch failures ([`IngestError::TransientNetwork`], [`IngestError::Parse`])
//! are recorded per unit and leave it pending, so the next run asks for it
//! again. Only the transient kind is expected to clear by itself (see
//! [`IngestError::is_retryable`]); a parse failure usually repeats and holds
//! its date back until the load runs with `allow_partial`.
//! [`IngestError::ForeignKeyViolation`] skips one staged file during the
//! load. The remaining variants abort the current phase.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;
use transit_ingestor::{io::csv::CsvError, providers::ProviderError};

/// Errors raised by the staging store, the catalog repository and the pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Network failure, timeout or retryable HTTP status after retries were exhausted.
    #[error("transient network failure: {0}")]
    TransientNetwork(#[source] ProviderError),

    /// The remote answered with something that could not be interpreted.
    #[error("unparsable response: {0}")]
    Parse(#[source] ProviderError),

    /// The day partition could not be created for a reason other than
    /// "already exists" (e.g. an overlapping table).
    #[error("partition for {date} conflicts: {message}")]
    PartitionConflict {
        /// Day whose partition failed.
        date: NaiveDate,
        /// Database message.
        message: String,
    },

    /// Staged data refers to a route the catalog does not know.
    #[error("route {route_id} of {city} is not in the catalog")]
    ForeignKeyViolation {
        /// City slug from the staged file name.
        city: String,
        /// Route id from the staged file name.
        route_id: i32,
    },

    /// Filesystem failure in the staging area.
    #[error("staging I/O on {}: {source}", path.display())]
    Staging {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A staged file could not be written or decoded as CSV.
    #[error("staged file {}: {source}", path.display())]
    StagedFile {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: CsvError,
    },

    /// Database failure in the catalog repository.
    #[error("catalog repository: {0:#}")]
    Catalog(#[from] anyhow::Error),

    /// Invalid or missing configuration.
    #[error("configuration: {0}")]
    Config(String),
}

impl IngestError {
    /// True for fetch failures that are likely to succeed on a later run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::TransientNetwork(_))
    }

    pub(crate) fn staging(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| IngestError::Staging { path, source }
    }

    pub(crate) fn staged_file(path: impl Into<PathBuf>) -> impl FnOnce(CsvError) -> Self {
        let path = path.into();
        move |source| IngestError::StagedFile { path, source }
    }
}

impl From<diesel::result::Error> for IngestError {
    fn from(e: diesel::result::Error) -> Self {
        IngestError::Catalog(e.into())
    }
}

impl From<ProviderError> for IngestError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Init { .. } => IngestError::Config(e.to_string()),
            e if e.is_transient() => IngestError::TransientNetwork(e),
            e => IngestError::Parse(e),
        }
    }
}
