mod common;
use common::{FakeSource, MemoryRepo, at, clock, d, options, point, record, setup_staging};

use telemetry_sync::{
    catalog::CatalogRepo,
    errors::IngestError,
    partition::partition_name,
    pipeline::{HeldBack, Pipeline, UnitOfWork, UnitState},
};
use transit_ingestor::models::city::City;

/// Catalog with kazan route 101 and one sample already loaded on 2024-01-04,
/// so the only pending date on 2024-01-06 is 2024-01-05.
fn kazan_repo(routes: &[(i32, &str)]) -> MemoryRepo {
    let mut repo = MemoryRepo::with_routes("kazan", routes);
    repo.telemetry.push(point(at(d(2024, 1, 4), 12, 0, 0), 101));
    repo
}

#[tokio::test]
async fn kazan_end_to_end() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default().with_telemetry(
        date,
        "kazan",
        101,
        vec![record(7, 15, 30, "a1b2c3d4"), record(7, 16, 0, "a1b2c3d4")],
    );
    let mut repo = kazan_repo(&[(101, "Автобус 1")]);
    let clock = clock(d(2024, 1, 6));

    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock);
    let report = pipeline.run(&mut repo).await.unwrap();

    assert_eq!(report.plan.dates, vec![date]);
    assert_eq!(source.telemetry_calls(), 1);

    let staged = staging.store.path_for(date, "kazan", 101);
    assert!(staged.ends_with("telemetry_2024_01_05/kazan_101_2024_01_05.csv"));
    assert_eq!(staging.store.read(&staged).unwrap().len(), 2);

    assert_eq!(report.load.loaded.len(), 1);
    assert_eq!(report.load.loaded[0].rows, 2);
    assert!(repo.partitions.contains(&date));
    assert_eq!(partition_name(date), "telemetry_2024_01_05");

    let rows = repo.rows_on(date);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|p| p.bus_id == 101));
    assert!(rows.iter().all(|p| p.upload_date == clock.started));
    assert_eq!(rows[0].timestamp, at(date, 7, 15, 30));

    let states = report.final_states();
    assert_eq!(
        states.get(&UnitOfWork::new(date, "kazan", 101)),
        Some(&UnitState::Loaded)
    );
}

#[tokio::test]
async fn second_fetch_makes_no_network_calls() {
    let staging = setup_staging();
    let source = FakeSource::default();
    let mut repo = MemoryRepo::with_routes("kazan", &[(101, "Автобус 1"), (102, "Трамвай 2")]);
    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock(d(2024, 1, 6)));

    let plan = pipeline.plan(&mut repo).unwrap();
    // empty table: a week back through yesterday
    assert_eq!(plan.start, d(2023, 12, 30));
    assert_eq!(plan.dates.len(), 7);

    let first = pipeline.fetch(&plan).await;
    assert_eq!(first.count(UnitState::Fetched), 14);
    assert_eq!(source.telemetry_calls(), 14);

    let second = pipeline.fetch(&plan).await;
    assert_eq!(second.count(UnitState::Skipped), 14);
    assert_eq!(source.telemetry_calls(), 14);
}

#[tokio::test]
async fn rerun_retries_only_the_failed_unit() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default()
        .with_telemetry(date, "kazan", 101, vec![record(8, 0, 0, "bus00101")])
        .with_telemetry(date, "kazan", 102, vec![record(9, 0, 0, "trm00102")]);
    source.fail(date, "kazan", 102);
    let mut repo = kazan_repo(&[(101, "Автобус 1"), (102, "Трамвай 2")]);
    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock(d(2024, 1, 6)));

    let first = pipeline.run(&mut repo).await.unwrap();
    assert_eq!(first.fetch.failures.len(), 1);
    assert!(matches!(
        first.fetch.failures[0].1,
        IngestError::TransientNetwork(_)
    ));
    assert_eq!(
        first.fetch.states[&UnitOfWork::new(date, "kazan", 102)],
        UnitState::Pending
    );
    // the date is incomplete, nothing is loaded yet
    let held = first.load.held_back.as_ref().unwrap();
    assert_eq!(held.date, date);
    assert_eq!(held.missing, vec![UnitOfWork::new(date, "kazan", 102)]);
    assert!(repo.rows_on(date).is_empty());
    assert_eq!(source.telemetry_calls(), 2);

    source.heal();
    let second = pipeline.run(&mut repo).await.unwrap();
    assert_eq!(source.telemetry_calls(), 3);
    assert_eq!(
        second.fetch.states[&UnitOfWork::new(date, "kazan", 101)],
        UnitState::Skipped
    );
    assert_eq!(
        second.fetch.states[&UnitOfWork::new(date, "kazan", 102)],
        UnitState::Fetched
    );
    assert_eq!(second.load.rows(), 2);
    assert_eq!(repo.rows_on(date).len(), 2);
}

#[tokio::test]
async fn incomplete_day_holds_back_later_days() {
    let staging = setup_staging();
    let (jan4, jan5) = (d(2024, 1, 4), d(2024, 1, 5));
    let source = FakeSource::default()
        .with_telemetry(jan4, "kazan", 101, vec![record(8, 0, 0, "bus00101")])
        .with_telemetry(jan5, "kazan", 101, vec![record(8, 0, 0, "bus00101")]);
    source.fail(jan4, "kazan", 101);
    let mut repo = MemoryRepo::with_routes("kazan", &[(101, "Автобус 1")]);
    repo.telemetry.push(point(at(d(2024, 1, 3), 12, 0, 0), 101));
    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock(d(2024, 1, 6)));

    let report = pipeline.run(&mut repo).await.unwrap();
    assert_eq!(report.plan.dates, vec![jan4, jan5]);
    assert!(staging.store.exists(jan5, "kazan", 101));
    assert_eq!(report.load.held_back.as_ref().map(|h| h.date), Some(jan4));
    assert!(report.load.loaded.is_empty());
    assert_eq!(repo.latest_loaded_date().unwrap(), Some(d(2024, 1, 3)));
}

#[tokio::test]
async fn missing_route_page_blocks_until_partial_load() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default()
        .with_telemetry(date, "kazan", 101, vec![record(8, 0, 0, "bus00101")])
        .without(date, "kazan", 102);
    let mut repo = kazan_repo(&[(101, "Автобус 1"), (102, "Трамвай 2")]);
    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock(d(2024, 1, 6)));

    let report = pipeline.run(&mut repo).await.unwrap();
    assert!(matches!(report.fetch.failures[0].1, IngestError::Parse(_)));
    let permanent: Vec<_> = report.fetch.permanent().collect();
    assert_eq!(permanent, vec![&UnitOfWork::new(date, "kazan", 102)]);

    let held = report.load.held_back.as_ref().unwrap();
    let message = held.to_string();
    assert!(message.contains("2024-01-05/kazan/102"), "{message}");
    assert!(message.contains("load --allow-partial"), "{message}");

    // a transient failure is not reported as permanent
    source.fail(date, "kazan", 101);
    let staged = staging.store.path_for(date, "kazan", 101);
    std::fs::remove_file(&staged).unwrap();
    let again = pipeline.fetch(&report.plan).await;
    assert_eq!(again.failures.len(), 2);
    assert_eq!(again.permanent().count(), 1);
}

#[test]
fn held_back_message_abbreviates_long_lists() {
    let date = d(2024, 1, 5);
    let held = HeldBack {
        date,
        missing: (1..=7).map(|id| UnitOfWork::new(date, "kazan", id)).collect(),
    };
    let message = held.to_string();
    assert!(message.starts_with("2024-01-05 is missing 2024-01-05/kazan/1, "));
    assert!(message.contains("2024-01-05/kazan/5 and 2 more"));
    assert!(!message.contains("kazan/6"));
}

#[tokio::test]
async fn allow_partial_loads_what_is_staged() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default()
        .with_telemetry(date, "kazan", 101, vec![record(8, 0, 0, "bus00101")]);
    source.fail(date, "kazan", 102);
    let mut repo = kazan_repo(&[(101, "Автобус 1"), (102, "Трамвай 2")]);
    let mut opts = options(&["kazan"]);
    opts.allow_partial = true;
    let pipeline = Pipeline::new(&source, &staging.store, opts, clock(d(2024, 1, 6)));

    let report = pipeline.run(&mut repo).await.unwrap();
    assert!(report.load.held_back.is_none());
    assert_eq!(report.load.rows(), 1);
    let states = report.final_states();
    assert_eq!(states[&UnitOfWork::new(date, "kazan", 101)], UnitState::Loaded);
    assert_eq!(states[&UnitOfWork::new(date, "kazan", 102)], UnitState::Pending);
}

#[tokio::test]
async fn unknown_routes_and_stray_rows_are_skipped() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default()
        .with_telemetry(date, "kazan", 101, vec![record(8, 0, 0, "bus00101")]);
    let mut repo = kazan_repo(&[(101, "Автобус 1")]);

    // route 999 is not in the catalog; route 101 carries a row from the next day
    staging
        .store
        .write(date, "kazan", 999, &[point(at(date, 10, 0, 0), 999)])
        .unwrap();
    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock(d(2024, 1, 6)));
    let plan = pipeline.plan(&mut repo).unwrap();
    pipeline.fetch(&plan).await;
    let path = staging.store.path_for(date, "kazan", 101);
    let mut rows = staging.store.read(&path).unwrap();
    rows.push(point(at(d(2024, 1, 6), 0, 5, 0), 101));
    staging.store.write(date, "kazan", 101, &rows).unwrap();

    let report = pipeline.load(&mut repo, &plan).unwrap();
    assert_eq!(report.fk_violations.len(), 1);
    assert!(matches!(
        report.fk_violations[0],
        IngestError::ForeignKeyViolation { route_id: 999, .. }
    ));
    assert_eq!(report.rows_out_of_window, 1);
    assert_eq!(report.rows_rejected, 0);
    assert_eq!(report.rows(), 1);
    assert!(repo.rows_on(date).iter().all(|p| p.bus_id == 101));
}

#[tokio::test]
async fn oversized_vehicle_ids_are_dropped() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default().with_telemetry(
        date,
        "kazan",
        101,
        vec![record(8, 0, 0, "bus00101"), record(8, 1, 0, "bus001010")],
    );
    let mut repo = kazan_repo(&[(101, "Автобус 1")]);
    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock(d(2024, 1, 6)));

    let report = pipeline.run(&mut repo).await.unwrap();
    assert_eq!(report.load.rows_rejected, 1);
    assert_eq!(report.load.rows(), 1);
    assert!(repo.rows_on(date).iter().all(|p| p.uniqueid == "bus00101"));
}

#[tokio::test]
async fn failed_load_keeps_staged_files() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default()
        .with_telemetry(date, "kazan", 101, vec![record(8, 0, 0, "bus00101")]);
    let mut repo = kazan_repo(&[(101, "Автобус 1")]);
    repo.fail_load_on = Some(date);
    let mut opts = options(&["kazan"]);
    opts.remove_temp = true;
    let pipeline = Pipeline::new(&source, &staging.store, opts, clock(d(2024, 1, 6)));

    let report = pipeline.run(&mut repo).await.unwrap();
    let (failed_on, err) = report.load.failed.as_ref().unwrap();
    assert_eq!(*failed_on, date);
    assert!(matches!(err, IngestError::PartitionConflict { .. }));
    assert!(staging.store.exists(date, "kazan", 101));

    // next run: nothing to fetch, the staged day loads and is cleaned up
    repo.fail_load_on = None;
    let report = pipeline.run(&mut repo).await.unwrap();
    assert_eq!(source.telemetry_calls(), 1);
    assert_eq!(report.load.rows(), 1);
    assert!(!staging.store.exists(date, "kazan", 101));
    assert!(!staging.store.date_folder(date).exists());
}

#[tokio::test]
async fn reloading_a_day_replaces_its_rows() {
    let staging = setup_staging();
    let date = d(2024, 1, 5);
    let source = FakeSource::default().with_telemetry(
        date,
        "kazan",
        101,
        vec![record(8, 0, 0, "bus00101"), record(8, 1, 0, "bus00101")],
    );
    let mut repo = kazan_repo(&[(101, "Автобус 1")]);
    let pipeline = Pipeline::new(&source, &staging.store, options(&["kazan"]), clock(d(2024, 1, 6)));

    let plan = pipeline.plan(&mut repo).unwrap();
    pipeline.fetch(&plan).await;
    pipeline.load(&mut repo, &plan).unwrap();
    // same plan again: the day is not skipped by the plan, only by the newest loaded date
    let again = pipeline.load(&mut repo, &plan).unwrap();
    assert_eq!(again.already_loaded, vec![date]);
    assert_eq!(repo.rows_on(date).len(), 2);
}

#[tokio::test]
async fn only_configured_cities_are_fetched() {
    let staging = setup_staging();
    let mut repo = MemoryRepo::with_routes("kazan", &[(101, "Автобус 1")]);
    let moskva = City::new("moskva");
    repo.cities.push(moskva.clone());
    repo.routes
        .push(transit_ingestor::models::route::Route::new(7, "Трамвай 7", moskva.id));
    let source = FakeSource::default();
    let pipeline = Pipeline::new(&source, &staging.store, options(&["moskva"]), clock(d(2024, 1, 6)));

    let plan = pipeline.plan(&mut repo).unwrap();
    assert_eq!(plan.routes, vec![("moskva".to_string(), 7)]);
    assert_eq!(plan.unit_count(), 7);
}
