//! Proximity query engine: radius-bounded nearest-neighbour search over the spatial index.
//!
//! A query walks H3 grid rings outward from the query cell. Every candidate's distance is
//! computed exactly once, from the same record that supplies its reported position, so the
//! position/distance pairing can never drift. Expansion stops at the ring whose lower distance
//! bound exceeds the radius, or earlier once `limit` candidates are held and none of the
//! remaining rings could beat the worst of them. Radii too large for a disk walk to pay off
//! fall back to a plain scan of the record table.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::error::{LocatorError, Result};
use crate::geo::{GeoPoint, EARTH_RADIUS_M};
use crate::spatial::{grid_disk_cell_count, SpatialIndex};
use crate::store::LocationRecord;

/// First grid disk radius visited; doubled on every expansion.
const INITIAL_RING_SPAN: u32 = 4;

/// Cells or records visited between deadline checks.
pub const DEADLINE_CHECK_INTERVAL: usize = 256;

/// Half the mean great circle: every point on the sphere is within this distance.
pub const MAX_SEARCH_RADIUS_M: f64 = std::f64::consts::PI * EARTH_RADIUS_M;

/// Radius-bounded nearest-neighbour request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityQuery {
    pub point: GeoPoint,
    pub max_radius_m: f64,
    /// Upper bound on the number of results. `usize::MAX` means unbounded.
    pub limit: usize,
}

impl ProximityQuery {
    pub fn new(point: GeoPoint, max_radius_m: f64, limit: usize) -> Self {
        Self {
            point,
            max_radius_m,
            limit,
        }
    }

    /// Every entity within the radius.
    pub fn unbounded(point: GeoPoint, max_radius_m: f64) -> Self {
        Self::new(point, max_radius_m, usize::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_radius_m.is_finite() || self.max_radius_m < 0.0 {
            return Err(LocatorError::invalid_input(format!(
                "max_radius_m must be a non-negative number of metres, got {}",
                self.max_radius_m
            )));
        }
        Ok(())
    }
}

/// A ranked query hit. `distance_m` is query-scoped and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_id: String,
    pub position: GeoPoint,
    pub timestamp_ms: i64,
    pub distance_m: f64,
}

impl Candidate {
    /// Ascending distance, ties broken by ascending entity id.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance_m
            .total_cmp(&other.distance_m)
            .then_with(|| self.entity_id.cmp(&other.entity_id))
    }
}

/// Max-heap adapter so the worst held candidate sits on top.
struct Ranked(Candidate);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.rank_cmp(&other.0)
    }
}

/// Best `limit` candidates seen so far.
struct TopK {
    limit: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopK {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            heap: BinaryHeap::new(),
        }
    }

    fn offer(&mut self, candidate: Candidate) {
        if self.heap.len() < self.limit {
            self.heap.push(Ranked(candidate));
            return;
        }
        let Some(worst) = self.heap.peek() else {
            return;
        };
        if candidate.rank_cmp(&worst.0) == Ordering::Less {
            self.heap.pop();
            self.heap.push(Ranked(candidate));
        }
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.limit
    }

    fn worst_distance_m(&self) -> Option<f64> {
        self.heap.peek().map(|ranked| ranked.0.distance_m)
    }

    fn into_sorted(self) -> Vec<Candidate> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|ranked| ranked.0)
            .collect()
    }
}

/// Run `query` against one consistent view of the index and the record table.
///
/// Records with a timestamp below `min_timestamp_ms` are skipped. Once the next grid disk
/// would hold more cells than there are records, the table is scanned directly instead, so
/// the work per query never exceeds a full scan. The deadline is checked every
/// [`DEADLINE_CHECK_INTERVAL`] cells or records; an expired query returns `DeadlineExceeded`
/// and has nothing to undo.
pub fn search(
    index: &SpatialIndex,
    records: &HashMap<String, LocationRecord>,
    query: &ProximityQuery,
    min_timestamp_ms: Option<i64>,
    deadline: Deadline,
) -> Result<Vec<Candidate>> {
    query.validate()?;
    check_deadline(deadline)?;
    if query.limit == 0 || index.is_empty() {
        return Ok(Vec::new());
    }

    let geo = *index.geo();
    let origin = query.point.to_cell(geo.resolution())?;
    // Nothing on the sphere is farther than half a great circle.
    let max_rings = geo.rings_for_radius(query.max_radius_m.min(MAX_SEARCH_RADIUS_M));
    let record_count = u64::try_from(records.len()).unwrap_or(u64::MAX);

    let mut best = TopK::new(query.limit);
    let mut scanned: Option<u32> = None;
    let mut span = INITIAL_RING_SPAN.min(max_rings);

    loop {
        check_deadline(deadline)?;
        if grid_disk_cell_count(span) > record_count {
            return scan_records(records, query, min_timestamp_ms, deadline);
        }

        let disk = index.grid_disk(origin, span);
        for (visited, &(cell, ring)) in disk.iter().enumerate() {
            if visited % DEADLINE_CHECK_INTERVAL == 0 {
                check_deadline(deadline)?;
            }
            if scanned.is_some_and(|done| ring <= done) {
                continue;
            }
            if geo.ring_lower_bound_m(ring) > query.max_radius_m {
                continue;
            }
            for entity_id in index.entities_in_cell(cell) {
                if let Some(record) = records.get(entity_id) {
                    consider(&mut best, record, query, min_timestamp_ms);
                }
            }
        }
        scanned = Some(span);

        if span >= max_rings {
            break;
        }
        let next_ring_bound = geo.ring_lower_bound_m(span + 1);
        if best.is_full() && best.worst_distance_m().is_some_and(|worst| worst < next_ring_bound) {
            break;
        }
        span = span.saturating_mul(2).min(max_rings);
    }

    Ok(best.into_sorted())
}

/// Exhaustive pass over the record table.
fn scan_records(
    records: &HashMap<String, LocationRecord>,
    query: &ProximityQuery,
    min_timestamp_ms: Option<i64>,
    deadline: Deadline,
) -> Result<Vec<Candidate>> {
    let mut best = TopK::new(query.limit);
    for (visited, record) in records.values().enumerate() {
        if visited % DEADLINE_CHECK_INTERVAL == 0 {
            check_deadline(deadline)?;
        }
        consider(&mut best, record, query, min_timestamp_ms);
    }
    Ok(best.into_sorted())
}

fn consider(
    best: &mut TopK,
    record: &LocationRecord,
    query: &ProximityQuery,
    min_timestamp_ms: Option<i64>,
) {
    if min_timestamp_ms.is_some_and(|min| record.timestamp_ms < min) {
        return;
    }
    let distance_m = query.point.distance_m(&record.position);
    if distance_m > query.max_radius_m {
        return;
    }
    best.offer(Candidate {
        entity_id: record.entity_id.clone(),
        position: record.position,
        timestamp_ms: record.timestamp_ms,
        distance_m,
    });
}

fn check_deadline(deadline: Deadline) -> Result<()> {
    if deadline.is_expired() {
        return Err(LocatorError::DeadlineExceeded {
            operation: "nearest",
        });
    }
    Ok(())
}
