//! Transit portal provider.
//!
//! - `GET <host>/` lists cities.
//! - `GET <host>/<city>/transport/<YYYY-MM-DD>` carries the route selector.
//! - `POST <host>/ajax/transport/` returns one route's telemetry for a day.

pub mod html;
pub mod params;
pub mod provider;
pub mod response;

pub use provider::{BustimeProvider, DEFAULT_HOST};
