//! Calendar helpers in the portal's time zone.
//!
//! The portal reports sample times as local wall-clock time of the city, and
//! "yesterday" is meant in that zone too. All dates handed to the pipeline
//! are derived here from a single `now` so one run sees one calendar.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Zone used when the configuration does not name one.
pub const DEFAULT_TZ: Tz = chrono_tz::Europe::Moscow;

/// Parse an IANA time zone name (e.g., "Europe/Moscow").
pub fn parse_tz(name: &str) -> anyhow::Result<Tz> {
    name.trim()
        .parse()
        .with_context(|| format!("bad tz: {name}"))
}

/// Calendar date of `instant` in `tz`.
pub fn date_in(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Wall-clock time of `instant` in `tz`, as stored in `upload_date`.
pub fn local_naive(instant: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    instant.with_timezone(&tz).naive_local()
}
