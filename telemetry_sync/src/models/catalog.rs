//! Catalog models: cities, routes and bus stops.
//!
//! - [`crate::schema::cities`]: city registry keyed by the hash-derived id
//! - [`crate::schema::routes`]: routes, each belonging to a city
//! - [`crate::schema::stops`]: OSM bus stops (no FK; stops may precede the catalog)
//!
//! Example (no_run)
//! ```no_run
//! use diesel::prelude::*;
//! use telemetry_sync::models::catalog::NewCity;
//! use telemetry_sync::schema;
//! use transit_ingestor::models::city::City;
//!
//! fn seed(conn: &mut PgConnection) -> diesel::QueryResult<()> {
//!     let kazan = City::new("kazan");
//!     diesel::insert_into(schema::cities::table)
//!         .values(NewCity::from(&kazan))
//!         .execute(conn)?;
//!     Ok(())
//! }
//! ```

use diesel::prelude::*;
use transit_ingestor::models::{city::City, route::Route, stop::Stop};

// ----------------------- cities -----------------------

/// A row in [`crate::schema::cities`].
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::cities, check_for_backend(diesel::pg::Pg))]
pub struct CityRow {
    /// `sha256(name) mod 10^8`.
    pub id: i64,
    /// City slug, unique.
    pub name: String,
}

impl From<CityRow> for City {
    fn from(row: CityRow) -> Self {
        City {
            id: row.id,
            name: row.name,
        }
    }
}

/// Insertable form of [`CityRow`].
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::cities)]
pub struct NewCity<'a> {
    /// Derived id.
    pub id: i64,
    /// City slug.
    pub name: &'a str,
}

impl<'a> From<&'a City> for NewCity<'a> {
    fn from(c: &'a City) -> Self {
        Self {
            id: c.id,
            name: &c.name,
        }
    }
}

// ----------------------- routes -----------------------

/// Insertable form of a [`crate::schema::routes`] row.
#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::routes)]
pub struct NewRoute<'a> {
    /// Portal route id.
    pub id: i32,
    /// Display name.
    pub name: &'a str,
    /// `bus`, `trolley`, `tram` or `other`.
    pub route_type: &'static str,
    /// FK to [`CityRow::id`].
    pub city_id: i64,
}

impl<'a> From<&'a Route> for NewRoute<'a> {
    fn from(r: &'a Route) -> Self {
        Self {
            id: r.id,
            name: &r.name,
            route_type: r.route_type.as_str(),
            city_id: r.city_id,
        }
    }
}

// ----------------------- stops ------------------------

/// Insertable/changeset form of a [`crate::schema::stops`] row.
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::stops)]
pub struct NewStop<'a> {
    /// OSM node id.
    pub id: i64,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// UTM zone EPSG code.
    pub utm: i32,
    /// Stop name, if tagged.
    pub name: Option<&'a str>,
    /// City the stop was queried for.
    pub city_id: i64,
}

impl<'a> From<&'a Stop> for NewStop<'a> {
    fn from(s: &'a Stop) -> Self {
        Self {
            id: s.id,
            lat: s.lat,
            lon: s.lon,
            utm: s.utm,
            name: s.name.as_deref(),
            city_id: s.city_id,
        }
    }
}
