//! Location store: one current-position record per entity, kept in lockstep with the
//! spatial index.
//!
//! The table and the index live behind a single `RwLock`. Every mutation (upsert, remove,
//! evict) holds the write lock for the whole remove-old/insert-new edit, and every query holds
//! the read lock for its whole traversal, so a query can never observe an entity in two cells
//! or a position that disagrees with its index bucket.

use std::collections::HashMap;
use std::sync::Arc;

use h3o::Resolution;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::{LocatorConfig, UpdateOrdering};
use crate::deadline::Deadline;
use crate::error::{LocatorError, Result};
use crate::geo::GeoPoint;
use crate::proximity::{self, Candidate, ProximityQuery};
use crate::spatial::{GeoIndex, SpatialIndex};

/// Current position of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub entity_id: String,
    pub position: GeoPoint,
    /// Epoch milliseconds reported by the entity.
    pub timestamp_ms: i64,
}

/// A location report for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub entity_id: String,
    pub position: GeoPoint,
    pub timestamp_ms: i64,
}

impl LocationUpdate {
    /// Validate and normalise a raw report.
    pub fn new(entity_id: &str, longitude: f64, latitude: f64, timestamp_ms: i64) -> Result<Self> {
        let entity_id = normalize_entity_id(entity_id)?;
        let position = GeoPoint::new(longitude, latitude)?;
        Ok(Self {
            entity_id,
            position,
            timestamp_ms,
        })
    }

    pub fn at(entity_id: &str, position: GeoPoint, timestamp_ms: i64) -> Result<Self> {
        Ok(Self {
            entity_id: normalize_entity_id(entity_id)?,
            position,
            timestamp_ms,
        })
    }
}

/// Trimmed, non-empty entity identity.
pub fn normalize_entity_id(entity_id: &str) -> Result<String> {
    let trimmed = entity_id.trim();
    if trimmed.is_empty() {
        return Err(LocatorError::invalid_input("entity_id cannot be empty"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Replaced,
    /// The update carried an older timestamp than the stored record and was dropped.
    IgnoredStale,
}

/// Backend holding current positions and answering proximity queries.
///
/// Implementations must be `Send + Sync`: the store is shared by every request task.
pub trait LocationStore: Send + Sync {
    /// Insert or replace the record for `update.entity_id`.
    fn upsert(&self, update: LocationUpdate, deadline: Deadline) -> Result<UpsertOutcome>;

    fn get(&self, entity_id: &str) -> Result<Option<LocationRecord>>;

    /// Nearest entities to `query.point`, ascending by distance then entity id.
    fn nearest(&self, query: &ProximityQuery, deadline: Deadline) -> Result<Vec<Candidate>>;

    fn remove(&self, entity_id: &str, deadline: Deadline) -> Result<Option<LocationRecord>>;

    /// Remove every record older than `cutoff_ms`; returns how many were removed.
    fn evict_older_than(&self, cutoff_ms: i64, deadline: Deadline) -> Result<usize>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Debug)]
struct StoreState {
    records: HashMap<String, LocationRecord>,
    index: SpatialIndex,
}

/// In-process location store backed by an H3 spatial index.
pub struct InMemoryLocationStore {
    state: RwLock<StoreState>,
    resolution: Resolution,
    ordering: UpdateOrdering,
    max_location_age_ms: Option<u64>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLocationStore {
    pub fn new(config: &LocatorConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &LocatorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let geo = GeoIndex::new(config.resolution()?);
        Ok(Self {
            state: RwLock::new(StoreState {
                records: HashMap::new(),
                index: SpatialIndex::new(geo, config.grid_disk_cache_capacity),
            }),
            resolution: geo.resolution(),
            ordering: config.update_ordering,
            max_location_age_ms: config.max_location_age_ms,
            clock,
        })
    }

    fn read(
        &self,
        deadline: Deadline,
        operation: &'static str,
    ) -> Result<RwLockReadGuard<'_, StoreState>> {
        if deadline.is_expired() {
            return Err(LocatorError::DeadlineExceeded { operation });
        }
        match deadline.instant() {
            None => Ok(self.state.read()),
            Some(at) => self
                .state
                .try_read_until(at)
                .ok_or(LocatorError::DeadlineExceeded { operation }),
        }
    }

    fn write(
        &self,
        deadline: Deadline,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, StoreState>> {
        if deadline.is_expired() {
            return Err(LocatorError::DeadlineExceeded { operation });
        }
        match deadline.instant() {
            None => Ok(self.state.write()),
            Some(at) => self
                .state
                .try_write_until(at)
                .ok_or(LocatorError::DeadlineExceeded { operation }),
        }
    }

    fn min_visible_timestamp_ms(&self) -> Option<i64> {
        self.max_location_age_ms.map(|max_age| {
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            self.clock.now_ms().saturating_sub(max_age)
        })
    }
}

impl std::fmt::Debug for InMemoryLocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryLocationStore")
            .field("record_count", &state.records.len())
            .field("occupied_cells", &state.index.occupied_cells())
            .field("ordering", &self.ordering)
            .finish()
    }
}

impl LocationStore for InMemoryLocationStore {
    fn upsert(&self, update: LocationUpdate, deadline: Deadline) -> Result<UpsertOutcome> {
        let cell = update.position.to_cell(self.resolution)?;
        let mut state = self.write(deadline, "upsert")?;

        let outcome = match state.records.get(&update.entity_id) {
            None => UpsertOutcome::Created,
            Some(existing)
                if self.ordering == UpdateOrdering::RejectStale
                    && update.timestamp_ms < existing.timestamp_ms =>
            {
                UpsertOutcome::IgnoredStale
            }
            Some(_) => UpsertOutcome::Replaced,
        };
        if outcome == UpsertOutcome::IgnoredStale {
            debug!(
                component = "store",
                entity_id = %update.entity_id,
                timestamp_ms = update.timestamp_ms,
                "stale_update_ignored"
            );
            return Ok(outcome);
        }

        let StoreState { records, index } = &mut *state;
        index.upsert(&update.entity_id, cell);
        records.insert(
            update.entity_id.clone(),
            LocationRecord {
                entity_id: update.entity_id,
                position: update.position,
                timestamp_ms: update.timestamp_ms,
            },
        );
        Ok(outcome)
    }

    fn get(&self, entity_id: &str) -> Result<Option<LocationRecord>> {
        Ok(self.state.read().records.get(entity_id.trim()).cloned())
    }

    fn nearest(&self, query: &ProximityQuery, deadline: Deadline) -> Result<Vec<Candidate>> {
        let min_timestamp_ms = self.min_visible_timestamp_ms();
        let state = self.read(deadline, "nearest")?;
        proximity::search(&state.index, &state.records, query, min_timestamp_ms, deadline)
    }

    fn remove(&self, entity_id: &str, deadline: Deadline) -> Result<Option<LocationRecord>> {
        let mut state = self.write(deadline, "remove")?;
        let entity_id = entity_id.trim();
        let removed = state.records.remove(entity_id);
        if removed.is_some() {
            state.index.remove(entity_id);
        }
        Ok(removed)
    }

    fn evict_older_than(&self, cutoff_ms: i64, deadline: Deadline) -> Result<usize> {
        let mut state = self.write(deadline, "evict")?;
        let stale: Vec<String> = state
            .records
            .values()
            .filter(|record| record.timestamp_ms < cutoff_ms)
            .map(|record| record.entity_id.clone())
            .collect();
        let StoreState { records, index } = &mut *state;
        for entity_id in &stale {
            records.remove(entity_id);
            index.remove(entity_id);
        }
        if !stale.is_empty() {
            debug!(
                component = "store",
                evicted = stale.len(),
                cutoff_ms,
                "stale_locations_evicted"
            );
        }
        Ok(stale.len())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.state.read().records.len())
    }
}
