//! Local staging store.
//!
//! Layout under the staging root:
//!
//! ```text
//! <root>/telemetry_<YYYY_MM_DD>/<city>_<route_id>_<YYYY_MM_DD>.csv
//! <root>/cities_<YYYY_MM_DD>.csv
//! <root>/routes_<YYYY_MM_DD>.csv
//! <root>/stops_<YYYY_MM_DD>.csv
//! ```
//!
//! A staged telemetry file means "already fetched", never "already loaded".
//! Files are written under a unique hidden name in the target directory and
//! renamed into place, so a reader sees either no file or a complete one.
//! Zero-row results are staged as a header-only file.

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use chrono::{Days, NaiveDate};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use transit_ingestor::{
    io::csv::{CsvRecord, read_rows, write_rows},
    models::{route::RouteId, telemetry::TelemetryPoint},
};
use uuid::Uuid;

use crate::errors::IngestError;

const DATE_FMT: &str = "%Y_%m_%d";
const TELEMETRY_PREFIX: &str = "telemetry_";

/// Catalog snapshot families kept at the staging root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// `cities_<date>.csv`
    Cities,
    /// `routes_<date>.csv`
    Routes,
    /// `stops_<date>.csv`
    Stops,
}

impl SnapshotKind {
    fn prefix(self) -> &'static str {
        match self {
            SnapshotKind::Cities => "cities",
            SnapshotKind::Routes => "routes",
            SnapshotKind::Stops => "stops",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One staged telemetry file found by [`StagingStore::staged_dates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// City slug.
    pub city: String,
    /// Route id.
    pub route_id: RouteId,
    /// Location on disk.
    pub path: PathBuf,
}

/// Filesystem-backed staging area rooted at the configured temp folder.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    /// Store rooted at `root`; nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every staged unit of `date`.
    pub fn date_folder(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{TELEMETRY_PREFIX}{}", date.format(DATE_FMT)))
    }

    /// Deterministic location of one unit's staged file.
    pub fn path_for(&self, date: NaiveDate, city: &str, route_id: RouteId) -> PathBuf {
        self.date_folder(date)
            .join(format!("{city}_{route_id}_{}.csv", date.format(DATE_FMT)))
    }

    /// Presence check only; contents are never inspected.
    pub fn exists(&self, date: NaiveDate, city: &str, route_id: RouteId) -> bool {
        self.path_for(date, city, route_id).is_file()
    }

    /// Stage one unit's rows, creating the date folder if needed.
    ///
    /// Overwrites an existing file for the same unit atomically.
    pub fn write(
        &self,
        date: NaiveDate,
        city: &str,
        route_id: RouteId,
        rows: &[TelemetryPoint],
    ) -> Result<PathBuf, IngestError> {
        let path = self.path_for(date, city, route_id);
        write_atomic(&path, rows)?;
        debug!("staged {} rows at {}", rows.len(), path.display());
        Ok(path)
    }

    /// Read a staged telemetry file.
    pub fn read(&self, path: &Path) -> Result<Vec<TelemetryPoint>, IngestError> {
        read_csv(path)
    }

    /// Every date in `[start, end]`, ascending; empty when `start > end`.
    pub fn list_pending_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .collect()
    }

    /// Staged telemetry files grouped by date, ascending.
    ///
    /// Temporary files, foreign files and folders whose name is not a date
    /// are ignored. Files are sorted by (city, route) within a date.
    pub fn staged_dates(&self) -> Result<BTreeMap<NaiveDate, Vec<StagedFile>>, IngestError> {
        let mut out = BTreeMap::new();
        for entry in read_dir_or_empty(&self.root)? {
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|n| n.strip_prefix(TELEMETRY_PREFIX))
                .and_then(|d| NaiveDate::parse_from_str(d, DATE_FMT).ok())
            else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }

            let mut files = Vec::new();
            for file in read_dir_or_empty(&entry.path())? {
                let path = file.path();
                match file.file_name().to_str().and_then(parse_unit_name) {
                    Some((city, route_id, file_date)) if file_date == date => {
                        files.push(StagedFile {
                            city,
                            route_id,
                            path,
                        });
                    }
                    Some(_) => warn!("{} is filed under the wrong date, ignoring", path.display()),
                    None => {}
                }
            }
            files.sort_by(|a, b| (&a.city, a.route_id).cmp(&(&b.city, b.route_id)));
            out.insert(date, files);
        }
        Ok(out)
    }

    /// Remove a date folder and everything in it. Missing folders are fine.
    pub fn remove_date(&self, date: NaiveDate) -> Result<(), IngestError> {
        let dir = self.date_folder(date);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("removed {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::staging(dir)(e)),
        }
    }

    /// Location of a catalog snapshot.
    pub fn snapshot_path(&self, kind: SnapshotKind, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{}_{}.csv", kind.prefix(), date.format(DATE_FMT)))
    }

    /// Write a catalog snapshot, replacing one of the same day.
    pub fn write_snapshot<T>(
        &self,
        kind: SnapshotKind,
        date: NaiveDate,
        rows: &[T],
    ) -> Result<PathBuf, IngestError>
    where
        T: CsvRecord + Serialize,
    {
        let path = self.snapshot_path(kind, date);
        write_atomic(&path, rows)?;
        debug!("saved {} {kind} at {}", rows.len(), path.display());
        Ok(path)
    }

    /// Newest snapshot of `kind` and its rows, if any exists.
    pub fn latest_snapshot<T>(
        &self,
        kind: SnapshotKind,
    ) -> Result<Option<(NaiveDate, Vec<T>)>, IngestError>
    where
        T: CsvRecord + DeserializeOwned,
    {
        let Some((date, path)) = self.snapshots(kind)?.pop() else {
            return Ok(None);
        };
        Ok(Some((date, read_csv(&path)?)))
    }

    /// Delete every snapshot of `kind`; returns how many were removed.
    pub fn remove_snapshots(&self, kind: SnapshotKind) -> Result<usize, IngestError> {
        let found = self.snapshots(kind)?;
        for (_, path) in &found {
            fs::remove_file(path).map_err(IngestError::staging(path))?;
            debug!("removed {}", path.display());
        }
        Ok(found.len())
    }

    /// Snapshots of `kind`, oldest first.
    fn snapshots(&self, kind: SnapshotKind) -> Result<Vec<(NaiveDate, PathBuf)>, IngestError> {
        let prefix = format!("{}_", kind.prefix());
        let mut found: Vec<(NaiveDate, PathBuf)> = read_dir_or_empty(&self.root)?
            .into_iter()
            .filter_map(|entry| {
                let name = entry.file_name();
                let date = name
                    .to_str()?
                    .strip_prefix(&prefix)?
                    .strip_suffix(".csv")
                    .and_then(|d| NaiveDate::parse_from_str(d, DATE_FMT).ok())?;
                Some((date, entry.path()))
            })
            .collect();
        found.sort();
        Ok(found)
    }
}

/// Parses `<city>_<route_id>_<YYYY>_<MM>_<DD>.csv`. City slugs may contain `_`.
fn parse_unit_name(name: &str) -> Option<(String, RouteId, NaiveDate)> {
    if name.starts_with('.') {
        return None;
    }
    let stem = name.strip_suffix(".csv")?;
    let mut parts = stem.rsplitn(5, '_');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    let route_id = parts.next()?.parse().ok()?;
    let city = parts.next().filter(|c| !c.is_empty())?;
    let date = NaiveDate::parse_from_str(&format!("{year}_{month}_{day}"), DATE_FMT).ok()?;
    Some((city.to_string(), route_id, date))
}

fn read_dir_or_empty(dir: &Path) -> Result<Vec<fs::DirEntry>, IngestError> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .collect::<Result<Vec<_>, _>>()
            .map_err(IngestError::staging(dir)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(IngestError::staging(dir)(e)),
    }
}

fn read_csv<T>(path: &Path) -> Result<Vec<T>, IngestError>
where
    T: CsvRecord + DeserializeOwned,
{
    let file = File::open(path).map_err(IngestError::staging(path))?;
    read_rows(BufReader::new(file)).map_err(IngestError::staged_file(path))
}

/// Write to `.<name>.<uuid>.tmp` next to `path`, fsync, then rename over `path`.
fn write_atomic<T>(path: &Path, rows: &[T]) -> Result<(), IngestError>
where
    T: CsvRecord + Serialize,
{
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(IngestError::staging(dir))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

    let result = (|| {
        let file = File::create(&tmp).map_err(IngestError::staging(&tmp))?;
        let mut writer = BufWriter::new(file);
        write_rows(&mut writer, rows).map_err(IngestError::staged_file(&tmp))?;
        let file = writer
            .into_inner()
            .map_err(|e| IngestError::staging(&tmp)(e.into_error()))?;
        file.sync_all().map_err(IngestError::staging(&tmp))?;
        fs::rename(&tmp, path).map_err(IngestError::staging(path))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// First day after `date`.
pub(crate) fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
}
