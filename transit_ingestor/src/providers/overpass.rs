//! OSM interpreter provider (bus stops).

pub mod provider;
pub mod response;

pub use provider::{DEFAULT_INTERPRETER_URL, OverpassProvider};
