//! Embedded schema migrations.

use anyhow::anyhow;
use diesel::{Connection, PgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

/// Embedded Diesel migrations bundled with this crate.
///
/// They create the `transport` schema with `cities`, `routes`, `stops` and
/// the range-partitioned `telemetry` parent table.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on a PostgreSQL database at the given URL.
pub fn run_postgres(url: &str) -> anyhow::Result<()> {
    let mut conn = PgConnection::establish(url)?;

    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?;
    for version in &applied {
        info!("applied migration {version}");
    }
    if applied.is_empty() {
        info!("schema is up to date");
    }

    Ok(())
}

/// Runs pending migrations for the given database URL.
///
/// Accepts URLs that start with "postgres://" or "postgresql://", returning
/// an error for any other scheme.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    if is_postgres_url(database_url) {
        run_postgres(database_url)
    } else {
        anyhow::bail!("Unsupported DATABASE_URL: {}", redact(database_url));
    }
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

/// Hides the password part of a connection URL for error messages.
pub(crate) fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            let creds = &url[scheme + 3..at];
            match creds.find(':') {
                Some(colon) => format!("{}{}:***{}", &url[..scheme + 3], &creds[..colon], &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
