//! Cities served by the transit portal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::io::csv::CsvRecord;

/// Stable numeric identifier of a city.
pub type CityId = i64;

/// Ids are the SHA-256 digest of the name reduced modulo 10^8.
pub const CITY_ID_MODULUS: u64 = 100_000_000;

/// A city as listed on the portal's front page.
///
/// `name` is the URL slug used by the portal (e.g. `"kazan"`), which is also
/// the `city_slug` form field of telemetry requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct City {
    /// Deterministic id, see [`city_id`].
    pub id: CityId,
    /// Portal slug, unique across the catalog.
    pub name: String,
}

impl City {
    /// Builds a city from its slug, deriving the id.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: city_id(&name),
            name,
        }
    }
}

impl CsvRecord for City {
    const HEADER: &'static [&'static str] = &["id", "name"];
}

/// Derives the id of a city from its name.
///
/// The digest is read as one big-endian unsigned integer and reduced modulo
/// [`CITY_ID_MODULUS`], so repeated scrapes always produce the same id
/// without a sequence counter.
pub fn city_id(name: &str) -> CityId {
    let digest = Sha256::digest(name.as_bytes());
    let id = digest
        .iter()
        .fold(0u64, |acc, b| (acc * 256 + u64::from(*b)) % CITY_ID_MODULUS);
    id as CityId
}
