use std::collections::HashSet;
use std::time::{Duration, Instant};

use locator_core::test_helpers::{
    brute_force_nearest, point, seeded_updates, BERLIN_LAT, BERLIN_LNG,
};
use locator_core::{
    Deadline, GeoPoint, InMemoryLocationStore, LocationRecord, LocationStore, LocatorConfig,
    ProximityQuery,
};

fn populated_store(
    config: &LocatorConfig,
    center: GeoPoint,
    count: usize,
) -> (InMemoryLocationStore, Vec<LocationRecord>) {
    let store = InMemoryLocationStore::new(config).expect("store");
    let mut records = Vec::with_capacity(count);
    for update in seeded_updates(42, count, center, 0.5) {
        records.push(LocationRecord {
            entity_id: update.entity_id.clone(),
            position: update.position,
            timestamp_ms: update.timestamp_ms,
        });
        store.upsert(update, Deadline::none()).expect("upsert");
    }
    (store, records)
}

fn ids(candidates: &[locator_core::Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.entity_id.as_str()).collect()
}

#[test]
fn radius_query_matches_brute_force() {
    let center = point(BERLIN_LNG, BERLIN_LAT);
    let (store, records) = populated_store(&LocatorConfig::default(), center, 300);

    for radius_m in [500.0, 5_000.0, 20_000.0, 60_000.0] {
        let query = ProximityQuery::unbounded(point(13.5, 52.45), radius_m);
        let expected = brute_force_nearest(&records, &query);
        let actual = store.nearest(&query, Deadline::none()).expect("nearest");
        assert_eq!(ids(&actual), ids(&expected), "radius {radius_m}");
        for (a, e) in actual.iter().zip(&expected) {
            assert_eq!(a.distance_m, e.distance_m);
        }
    }
}

#[test]
fn each_entity_appears_at_most_once() {
    let center = point(BERLIN_LNG, BERLIN_LAT);
    let (store, _) = populated_store(&LocatorConfig::default(), center, 300);
    let query = ProximityQuery::unbounded(center, 100_000.0);
    let hits = store.nearest(&query, Deadline::none()).expect("nearest");

    let unique: HashSet<_> = hits.iter().map(|c| c.entity_id.clone()).collect();
    assert_eq!(unique.len(), hits.len());
    assert_eq!(hits.len(), 300);
}

#[test]
fn results_are_ranked_by_distance_then_id() {
    let center = point(BERLIN_LNG, BERLIN_LAT);
    let (store, _) = populated_store(&LocatorConfig::default(), center, 200);
    let hits = store
        .nearest(&ProximityQuery::unbounded(center, 40_000.0), Deadline::none())
        .expect("nearest");

    for pair in hits.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.distance_m < b.distance_m
                || (a.distance_m == b.distance_m && a.entity_id < b.entity_id),
            "{} ({}) ranked before {} ({})",
            a.entity_id,
            a.distance_m,
            b.entity_id,
            b.distance_m
        );
        assert!(b.distance_m <= 40_000.0);
    }
}

#[test]
fn limit_returns_the_brute_force_prefix() {
    let center = point(BERLIN_LNG, BERLIN_LAT);
    for resolution in [5_u8, 7, 9] {
        let config = LocatorConfig::default().with_h3_resolution(resolution);
        let (store, records) = populated_store(&config, center, 250);
        let query = ProximityQuery::new(point(13.3, 52.6), 50_000.0, 5);
        let expected = brute_force_nearest(&records, &query);
        let actual = store.nearest(&query, Deadline::none()).expect("nearest");
        assert_eq!(ids(&actual), ids(&expected), "resolution {resolution}");
    }
}

#[test]
fn query_across_the_antimeridian_finds_the_other_side() {
    let store = InMemoryLocationStore::new(&LocatorConfig::default()).expect("store");
    let update = locator_core::LocationUpdate::new("east", -179.95, 0.0, 0).expect("update");
    store.upsert(update, Deadline::none()).expect("upsert");

    let hits = store
        .nearest(&ProximityQuery::unbounded(point(179.95, 0.0), 20_000.0), Deadline::none())
        .expect("nearest");
    assert_eq!(ids(&hits), vec!["east"]);
    assert!(hits[0].distance_m < 12_000.0);
}

#[test]
fn all_points_outside_radius_give_empty_result() {
    let center = point(BERLIN_LNG, BERLIN_LAT);
    let (store, _) = populated_store(&LocatorConfig::default(), center, 50);
    let far_away = point(-74.0, 40.7);
    let hits = store
        .nearest(&ProximityQuery::unbounded(far_away, 50_000.0), Deadline::none())
        .expect("nearest");
    assert!(hits.is_empty());
}

#[test]
fn planet_sized_radius_finishes_within_a_short_deadline() {
    let center = point(BERLIN_LNG, BERLIN_LAT);
    let (store, records) = populated_store(&LocatorConfig::default(), center, 2_000);

    for radius_m in [3_000_000.0, 20_000_000.0, 1.0e12] {
        let query = ProximityQuery::new(point(0.0, 0.0), radius_m, 1);
        let started = Instant::now();
        let hits = store
            .nearest(&query, Deadline::after(Duration::from_millis(200)))
            .expect("nearest");

        assert!(
            started.elapsed() < Duration::from_millis(400),
            "radius {radius_m} took {:?}",
            started.elapsed()
        );
        assert_eq!(ids(&hits), ids(&brute_force_nearest(&records, &query)));
    }
}
