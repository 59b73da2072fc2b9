//! PostgreSQL statements behind [`CatalogRepo`].
//!
//! The free functions take a `&mut PgConnection` so they compose inside a
//! caller's transaction; [`PgCatalogRepo`] owns a connection and exposes them
//! through the trait.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::{
    PgConnection, insert_into,
    prelude::*,
    result::Error as DieselError,
    sql_query,
    upsert::excluded,
};
use tracing::{debug, info, warn};
use transit_ingestor::models::{
    city::City,
    route::{Route, RouteId},
    stop::Stop,
    telemetry::TelemetryPoint,
};

use crate::{
    catalog::{CatalogLoad, CatalogRepo},
    errors::IngestError,
    models::{
        NewTelemetry, TELEMETRY_COLUMNS, TelemetryRow,
        catalog::{CityRow, NewCity, NewRoute, NewStop},
    },
    partition::{create_partition_sql, is_already_exists, partition_name},
    schema::{cities, routes, stops, telemetry},
    staging::next_day,
};

/// PostgreSQL caps one statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per INSERT for a table with `columns` columns.
pub fn chunk_rows(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// All cities, ordered by name.
pub fn list_cities(conn: &mut PgConnection) -> anyhow::Result<Vec<City>> {
    let rows = cities::table
        .select(CityRow::as_select())
        .order(cities::name)
        .load(conn)?;
    Ok(rows.into_iter().map(City::from).collect())
}

/// `(city name, route id)` pairs, joined through the FK.
pub fn list_routes(conn: &mut PgConnection) -> anyhow::Result<Vec<(String, RouteId)>> {
    let rows = routes::table
        .inner_join(cities::table)
        .select((cities::name, routes::id))
        .order((cities::name, routes::id))
        .load::<(String, RouteId)>(conn)?;
    Ok(rows)
}

/// Date of the newest telemetry sample.
pub fn latest_loaded_date(conn: &mut PgConnection) -> anyhow::Result<Option<NaiveDate>> {
    let newest: Option<NaiveDateTime> = telemetry::table
        .select(diesel::dsl::max(telemetry::timestamp))
        .first(conn)?;
    Ok(newest.map(|ts| ts.date()))
}

/// Routes that can be inserted: unique id and a city present in `cities`.
///
/// Returns the kept routes and the number dropped.
pub fn filter_routes<'a>(cities: &[City], routes: &'a [Route]) -> (Vec<&'a Route>, usize) {
    let city_ids: HashSet<i64> = cities.iter().map(|c| c.id).collect();
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(routes.len());
    for route in routes {
        if !city_ids.contains(&route.city_id) {
            warn!(
                "route {} ({}) refers to unknown city {}, dropping",
                route.id, route.name, route.city_id
            );
            continue;
        }
        if !seen.insert(route.id) {
            warn!("route {} listed twice, keeping the first", route.id);
            continue;
        }
        kept.push(route);
    }
    let dropped = routes.len() - kept.len();
    (kept, dropped)
}

/// Truncate-and-append cities and routes.
///
/// Callers wrap this in a transaction.
pub fn replace_catalog(
    conn: &mut PgConnection,
    cities: &[City],
    routes: &[Route],
) -> anyhow::Result<CatalogLoad> {
    let mut seen = HashSet::new();
    let cities: Vec<City> = cities.iter().filter(|c| seen.insert(c.id)).cloned().collect();
    let (routes, routes_dropped) = filter_routes(&cities, routes);

    diesel::delete(routes::table).execute(conn)?;
    diesel::delete(cities::table).execute(conn)?;

    let mut load = CatalogLoad {
        routes_dropped,
        ..CatalogLoad::default()
    };
    for chunk in cities.chunks(chunk_rows(2)) {
        let rows: Vec<NewCity<'_>> = chunk.iter().map(NewCity::from).collect();
        load.cities += insert_into(cities::table).values(&rows).execute(conn)?;
    }
    for chunk in routes.chunks(chunk_rows(4)) {
        let rows: Vec<NewRoute<'_>> = chunk.iter().map(|r| NewRoute::from(*r)).collect();
        load.routes += insert_into(routes::table).values(&rows).execute(conn)?;
    }
    Ok(load)
}

/// Create the day partition; "already exists" from a concurrent creator is success.
///
/// Runs in its own savepoint so a failure does not poison an enclosing
/// transaction.
pub fn ensure_partition(conn: &mut PgConnection, date: NaiveDate) -> Result<(), IngestError> {
    let sql = create_partition_sql(date);
    let created = conn.transaction::<_, DieselError, _>(|c| sql_query(&sql).execute(c).map(|_| ()));
    match created {
        Ok(()) => {
            debug!("partition {} ready", partition_name(date));
            Ok(())
        }
        Err(DieselError::DatabaseError(_, info)) if is_already_exists(info.message()) => {
            debug!("partition {} created concurrently", partition_name(date));
            Ok(())
        }
        Err(DieselError::DatabaseError(_, info)) => Err(IngestError::PartitionConflict {
            date,
            message: info.message().to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Bulk insert, chunked under the bind-parameter limit.
pub fn append_telemetry(conn: &mut PgConnection, rows: &[TelemetryPoint]) -> anyhow::Result<usize> {
    let mut written = 0;
    for chunk in rows.chunks(chunk_rows(TELEMETRY_COLUMNS)) {
        let batch: Vec<NewTelemetry<'_>> = chunk.iter().map(NewTelemetry::from).collect();
        written += insert_into(telemetry::table).values(&batch).execute(conn)?;
    }
    Ok(written)
}

/// Delete every sample in `[date, date + 1)`.
pub fn delete_day(conn: &mut PgConnection, date: NaiveDate) -> anyhow::Result<usize> {
    let from = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let mut query = diesel::delete(telemetry::table)
        .filter(telemetry::timestamp.ge(from))
        .into_boxed();
    if let Some(to) = next_day(date).and_then(|d| d.and_hms_opt(0, 0, 0)) {
        query = query.filter(telemetry::timestamp.lt(to));
    }
    Ok(query.execute(conn)?)
}

/// Samples of one day, oldest first.
pub fn day_rows(conn: &mut PgConnection, date: NaiveDate) -> anyhow::Result<Vec<TelemetryRow>> {
    let from = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let mut query = telemetry::table
        .filter(telemetry::timestamp.ge(from))
        .order((telemetry::timestamp, telemetry::uniqueid))
        .select(TelemetryRow::as_select())
        .into_boxed();
    if let Some(to) = next_day(date).and_then(|d| d.and_hms_opt(0, 0, 0)) {
        query = query.filter(telemetry::timestamp.lt(to));
    }
    Ok(query.load(conn)?)
}

/// Insert or update stops by id; duplicates within `stops` keep the first.
pub fn upsert_stops(conn: &mut PgConnection, stops: &[Stop]) -> anyhow::Result<usize> {
    let mut seen = HashSet::new();
    let unique: Vec<NewStop<'_>> = stops
        .iter()
        .filter(|s| seen.insert(s.id))
        .map(NewStop::from)
        .collect();

    let mut written = 0;
    for chunk in unique.chunks(chunk_rows(6)) {
        written += insert_into(stops::table)
            .values(chunk)
            .on_conflict(stops::id)
            .do_update()
            .set((
                stops::lat.eq(excluded(stops::lat)),
                stops::lon.eq(excluded(stops::lon)),
                stops::utm.eq(excluded(stops::utm)),
                stops::name.eq(excluded(stops::name)),
                stops::city_id.eq(excluded(stops::city_id)),
            ))
            .execute(conn)?;
    }
    Ok(written)
}

/// [`CatalogRepo`] over one PostgreSQL connection.
pub struct PgCatalogRepo {
    conn: PgConnection,
}

impl PgCatalogRepo {
    /// Wrap an open connection.
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }

    /// Borrow the underlying connection.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

impl CatalogRepo for PgCatalogRepo {
    fn list_cities(&mut self) -> Result<Vec<City>, IngestError> {
        Ok(list_cities(&mut self.conn)?)
    }

    fn list_routes(&mut self) -> Result<Vec<(String, RouteId)>, IngestError> {
        Ok(list_routes(&mut self.conn)?)
    }

    fn latest_loaded_date(&mut self) -> Result<Option<NaiveDate>, IngestError> {
        Ok(latest_loaded_date(&mut self.conn)?)
    }

    fn upsert_catalog(&mut self, cities: &[City], routes: &[Route]) -> Result<CatalogLoad, IngestError> {
        let load = self
            .conn
            .transaction(|c| replace_catalog(c, cities, routes))?;
        info!(
            "catalog replaced: {} cities, {} routes ({} dropped)",
            load.cities, load.routes, load.routes_dropped
        );
        Ok(load)
    }

    fn ensure_partition(&mut self, date: NaiveDate) -> Result<(), IngestError> {
        ensure_partition(&mut self.conn, date)
    }

    fn append_telemetry(&mut self, rows: &[TelemetryPoint]) -> Result<usize, IngestError> {
        Ok(append_telemetry(&mut self.conn, rows)?)
    }

    fn load_day(&mut self, date: NaiveDate, rows: &[TelemetryPoint]) -> Result<usize, IngestError> {
        self.conn.transaction::<_, IngestError, _>(|c| {
            ensure_partition(c, date)?;
            let replaced = delete_day(c, date)?;
            if replaced > 0 {
                debug!("{date}: replacing {replaced} previously loaded rows");
            }
            Ok(append_telemetry(c, rows)?)
        })
    }

    fn upsert_stops(&mut self, stops: &[Stop]) -> Result<usize, IngestError> {
        Ok(upsert_stops(&mut self.conn, stops)?)
    }
}
