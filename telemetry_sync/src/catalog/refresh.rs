//! Rebuilding the catalog tables from the remote sources.
//!
//! Both refreshes go through a staged snapshot first (`cities_<date>.csv`,
//! `routes_<date>.csv`, `stops_<date>.csv`) and load from disk, so a failed
//! load can be retried without scraping again.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};
use transit_ingestor::{
    models::{city::City, route::Route, stop::Stop},
    providers::{StopSource, TransitSource},
};

use crate::{
    catalog::{CatalogLoad, CatalogRepo},
    errors::IngestError,
    staging::{SnapshotKind, StagingStore},
};

/// Inputs of a catalog refresh.
#[derive(Debug, Clone)]
pub struct CatalogRefresh<'a> {
    /// Scrape the city list.
    pub update_cities: bool,
    /// Scrape the routes of `cities`.
    pub update_routes: bool,
    /// Configured city slugs.
    pub cities: &'a [String],
    /// Date of the route pages.
    pub routes_date: NaiveDate,
    /// Date stamped into snapshot names.
    pub today: NaiveDate,
    /// Delete snapshots once loaded.
    pub remove_temp: bool,
}

/// Scrape what the flags ask for, then load the snapshots if both exist.
///
/// Any failure is returned to the caller; a partial catalog is never loaded.
/// Returns `None` when there was nothing to load.
pub async fn refresh_catalog<R>(
    source: &dyn TransitSource,
    repo: &mut R,
    store: &StagingStore,
    opts: &CatalogRefresh<'_>,
) -> Result<Option<CatalogLoad>, IngestError>
where
    R: CatalogRepo + ?Sized,
{
    if opts.update_cities {
        let cities = source.fetch_catalog().await?;
        info!("portal lists {} cities", cities.len());
        store.write_snapshot(SnapshotKind::Cities, opts.today, &cities)?;
    }

    if opts.update_routes {
        let known = known_cities(source, repo, store).await?;
        let mut routes = Vec::new();
        for name in opts.cities {
            if !known.contains(name.as_str()) {
                warn!("{name} is not in the city catalog; its routes will be dropped on load");
            }
            let city = City::new(name.as_str());
            let found = source.fetch_routes(&city, opts.routes_date).await?;
            info!("{name}: {} routes on {}", found.len(), opts.routes_date);
            routes.extend(found);
        }
        store.write_snapshot(SnapshotKind::Routes, opts.today, &routes)?;
    }

    let cities = store.latest_snapshot::<City>(SnapshotKind::Cities)?;
    let routes = store.latest_snapshot::<Route>(SnapshotKind::Routes)?;
    let (Some((cities_date, cities)), Some((routes_date, routes))) = (cities, routes) else {
        return Ok(None);
    };
    info!("loading catalog snapshots of {cities_date} (cities) and {routes_date} (routes)");

    let load = repo.upsert_catalog(&cities, &routes)?;
    if opts.remove_temp {
        store.remove_snapshots(SnapshotKind::Cities)?;
        store.remove_snapshots(SnapshotKind::Routes)?;
    }
    Ok(Some(load))
}

/// City names from the repository, falling back to the latest snapshot and
/// then to the portal.
async fn known_cities<R>(
    source: &dyn TransitSource,
    repo: &mut R,
    store: &StagingStore,
) -> Result<HashSet<String>, IngestError>
where
    R: CatalogRepo + ?Sized,
{
    let mut cities = repo.list_cities()?;
    if cities.is_empty() {
        if let Some((_, snapshot)) = store.latest_snapshot::<City>(SnapshotKind::Cities)? {
            cities = snapshot;
        }
    }
    if cities.is_empty() {
        info!("no cities in the catalog, asking the portal");
        cities = source.fetch_catalog().await?;
    }
    Ok(cities.into_iter().map(|c| c.name).collect())
}

/// Outcome of [`refresh_stops`].
#[derive(Debug, Default)]
pub struct StopsReport {
    /// Stops written to the database.
    pub stored: usize,
    /// Cities whose fetch failed, with the reason.
    pub failed: Vec<(String, IngestError)>,
}

/// Fetch bus stops of every configured city, snapshot them, then upsert.
///
/// A failing city is reported and skipped; the others are still stored.
pub async fn refresh_stops<R>(
    source: &dyn StopSource,
    repo: &mut R,
    store: &StagingStore,
    cities: &[String],
    today: NaiveDate,
    remove_temp: bool,
) -> Result<StopsReport, IngestError>
where
    R: CatalogRepo + ?Sized,
{
    let mut report = StopsReport::default();
    let mut stops: Vec<Stop> = Vec::new();
    for name in cities {
        match source.fetch_stops(&City::new(name.as_str())).await {
            Ok(found) => {
                info!("{name}: {} bus stops", found.len());
                stops.extend(found);
            }
            Err(e) => {
                warn!("{name}: stop fetch failed: {e}");
                report.failed.push((name.clone(), e.into()));
            }
        }
    }

    store.write_snapshot(SnapshotKind::Stops, today, &stops)?;
    report.stored = repo.upsert_stops(&stops)?;
    if remove_temp {
        store.remove_snapshots(SnapshotKind::Stops)?;
    }
    Ok(report)
}
