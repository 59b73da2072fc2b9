//! Day partitions of `transport.telemetry`.
//!
//! One partition per calendar day, named `telemetry_<YYYY_MM_DD>` and bounded
//! `[date, date + 1)`. DDL text is generated here; execution lives in
//! [`crate::catalog::repo`].

use chrono::{Days, NaiveDate};

/// Schema holding all transport tables.
pub const SCHEMA: &str = "transport";

/// Range-partitioned parent table.
pub const PARENT: &str = "telemetry";

/// Partition table name (without schema) for `date`.
pub fn partition_name(date: NaiveDate) -> String {
    format!("{PARENT}_{}", date.format("%Y_%m_%d"))
}

/// Half-open bounds `[date, date + 1)` as SQL date literals.
pub fn bounds(date: NaiveDate) -> (String, String) {
    let upper = date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    (date.format("%Y-%m-%d").to_string(), upper.format("%Y-%m-%d").to_string())
}

/// `CREATE TABLE IF NOT EXISTS` statement attaching the day partition.
///
/// Only dates reach this function, so the interpolated identifiers and
/// literals are digits and underscores.
pub fn create_partition_sql(date: NaiveDate) -> String {
    let (from, to) = bounds(date);
    format!(
        "CREATE TABLE IF NOT EXISTS {SCHEMA}.{name} PARTITION OF {SCHEMA}.{PARENT} \
         FOR VALUES FROM ('{from}') TO ('{to}')",
        name = partition_name(date),
    )
}

/// True when a database error message means the partition is already there.
///
/// `IF NOT EXISTS` covers the sequential case; a concurrent creator can still
/// win the race between the existence check and the insert into the catalog.
pub fn is_already_exists(message: &str) -> bool {
    message.contains("already exists")
}
