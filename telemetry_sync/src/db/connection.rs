//! PostgreSQL connection helpers.

use diesel::{Connection, PgConnection, RunQueryDsl, sql_query};

/// Open a PostgreSQL connection and apply session-wide settings.
///
/// Telemetry timestamps are stored without a zone; the session runs in UTC.
pub fn connect_pg(database_url: &str) -> anyhow::Result<PgConnection> {
    let mut conn = PgConnection::establish(database_url)?;

    sql_query("SET TIME ZONE 'UTC'").execute(&mut conn)?;
    sql_query("SET statement_timeout = '5min'").execute(&mut conn)?;
    Ok(conn)
}
