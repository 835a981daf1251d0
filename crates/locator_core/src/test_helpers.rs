//! Test helpers for common test setup and utilities.
//!
//! Shared fixtures for unit tests, integration tests, and benches: seeded driver
//! populations, a ready-made locator, and backends that always fail.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::LocatorConfig;
use crate::deadline::Deadline;
use crate::directory::{InMemoryUserDirectory, ProfileRecord, UserDirectory};
use crate::error::{LocatorError, Result};
use crate::geo::GeoPoint;
use crate::locator::Locator;
use crate::proximity::{Candidate, ProximityQuery};
use crate::store::{
    InMemoryLocationStore, LocationRecord, LocationStore, LocationUpdate, UpsertOutcome,
};

/// Berlin city centre, used as the default population centre.
pub const BERLIN_LNG: f64 = 13.405;
pub const BERLIN_LAT: f64 = 52.52;

/// Build a point from known-good coordinates.
///
/// # Panics
///
/// Panics if the coordinates are out of range.
pub fn point(longitude: f64, latitude: f64) -> GeoPoint {
    GeoPoint::new(longitude, latitude).expect("test coordinates should be valid")
}

/// `count` updates scattered uniformly within `spread_deg` of the centre, ids `driver-0000`...
pub fn seeded_updates(
    seed: u64,
    count: usize,
    center: GeoPoint,
    spread_deg: f64,
) -> Vec<LocationUpdate> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let lng = center.longitude() + rng.gen_range(-spread_deg..=spread_deg);
            let lat = center.latitude() + rng.gen_range(-spread_deg..=spread_deg);
            LocationUpdate {
                entity_id: format!("driver-{i:04}"),
                position: point(lng.clamp(-180.0, 180.0), lat.clamp(-90.0, 90.0)),
                timestamp_ms: i as i64,
            }
        })
        .collect()
}

/// In-memory store and directory wired into a locator.
pub fn in_memory_locator(config: LocatorConfig) -> Result<Locator> {
    let store = Arc::new(InMemoryLocationStore::new(&config)?);
    let directory = Arc::new(InMemoryUserDirectory::new());
    Locator::new(store, directory, config)
}

/// Register a profile named after the entity.
pub fn register_profile(directory: &dyn UserDirectory, entity_id: &str) -> Result<()> {
    directory.upsert_profile(ProfileRecord::new(
        entity_id,
        &format!("Driver {entity_id}"),
        &format!("{entity_id}@example.com"),
        0,
    )?)
}

/// Brute-force reference: every stored record within `radius_m`, ranked.
pub fn brute_force_nearest(records: &[LocationRecord], query: &ProximityQuery) -> Vec<Candidate> {
    let mut hits: Vec<Candidate> = records
        .iter()
        .filter_map(|record| {
            let distance_m = query.point.distance_m(&record.position);
            (distance_m <= query.max_radius_m).then(|| Candidate {
                entity_id: record.entity_id.clone(),
                position: record.position,
                timestamp_ms: record.timestamp_ms,
                distance_m,
            })
        })
        .collect();
    hits.sort_by(Candidate::rank_cmp);
    hits.truncate(query.limit);
    hits
}

/// Location backend that is always down.
#[derive(Debug, Default)]
pub struct UnavailableLocationStore;

impl LocationStore for UnavailableLocationStore {
    fn upsert(&self, _update: LocationUpdate, _deadline: Deadline) -> Result<UpsertOutcome> {
        Err(LocatorError::StoreUnavailable("connection refused".to_string()))
    }

    fn get(&self, _entity_id: &str) -> Result<Option<LocationRecord>> {
        Err(LocatorError::StoreUnavailable("connection refused".to_string()))
    }

    fn nearest(&self, _query: &ProximityQuery, _deadline: Deadline) -> Result<Vec<Candidate>> {
        Err(LocatorError::StoreUnavailable("connection refused".to_string()))
    }

    fn remove(&self, _entity_id: &str, _deadline: Deadline) -> Result<Option<LocationRecord>> {
        Err(LocatorError::StoreUnavailable("connection refused".to_string()))
    }

    fn evict_older_than(&self, _cutoff_ms: i64, _deadline: Deadline) -> Result<usize> {
        Err(LocatorError::StoreUnavailable("connection refused".to_string()))
    }

    fn len(&self) -> Result<usize> {
        Err(LocatorError::StoreUnavailable("connection refused".to_string()))
    }
}

/// Directory backend that is always down.
#[derive(Debug, Default)]
pub struct UnavailableUserDirectory;

impl UserDirectory for UnavailableUserDirectory {
    fn upsert_profile(&self, _profile: ProfileRecord) -> Result<()> {
        Err(LocatorError::DirectoryUnavailable("timeout".to_string()))
    }

    fn lookup(&self, _entity_id: &str) -> Result<Option<ProfileRecord>> {
        Err(LocatorError::DirectoryUnavailable("timeout".to_string()))
    }
}
