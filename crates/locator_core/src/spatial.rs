//! Spatial operations: H3-based bucketing of entity positions.
//!
//! This module provides:
//!
//! - **GeoIndex**: H3 resolution plus conservative ring-distance bounds
//! - **GridDiskCache**: LRU cache of grid disks annotated with ring distance
//! - **SpatialIndex**: H3 cell → entity mappings for radius queries without full scans
//!
//! Default resolution is 7 (~1.4 km hexagon edge), which keeps a 50 km radius query
//! within a few thousand cells.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use h3o::{CellIndex, Resolution};
use lru::LruCache;
use parking_lot::Mutex;

/// Cells of a grid disk with their grid distance from the origin.
pub type RingCells = Arc<Vec<(CellIndex, u32)>>;

#[derive(Debug, Clone, Copy)]
pub struct GeoIndex {
    resolution: Resolution,
    min_edge_m: f64,
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        // H3 hexagons vary in size across the globe and pentagons are smaller still;
        // half the average edge length stays below the smallest cell edge.
        let min_edge_m = resolution.edge_length_m() * 0.5;
        Self {
            resolution,
            min_edge_m,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Lower bound on the distance from any point in the origin cell to any point in a
    /// cell `ring` grid steps away.
    ///
    /// Hexagon centres advance at least 1.5 edges per grid step and a point sits at most
    /// one edge from its centre, on either end.
    pub fn ring_lower_bound_m(&self, ring: u32) -> f64 {
        ((1.5 * f64::from(ring)) - 2.0).max(0.0) * self.min_edge_m
    }

    /// Smallest ring count that contains every point within `radius_m` of the origin cell.
    pub fn rings_for_radius(&self, radius_m: f64) -> u32 {
        let rings = ((radius_m.max(0.0) / self.min_edge_m) + 2.0) / 1.5;
        rings.ceil().min(f64::from(u32::MAX)) as u32
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new(Resolution::Seven)
    }
}

/// Largest disk kept in the cache; bigger disks are computed per query and dropped.
pub const MAX_CACHED_DISK_CELLS: usize = 4_096;

/// Number of cells in a hexagonal grid disk of radius `k` (pentagons make it slightly less).
pub fn grid_disk_cell_count(k: u32) -> u64 {
    let k = u64::from(k);
    1 + 3 * k * (k + 1)
}

/// Grid disk cache for radius queries.
pub struct GridDiskCache {
    cache: Mutex<LruCache<(CellIndex, u32), RingCells>>,
}

impl GridDiskCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Disks are built outside the lock so a large disk never stalls other queries.
    pub fn get_or_compute(&self, origin: CellIndex, k: u32) -> RingCells {
        let cached = self.cache.lock().get(&(origin, k)).cloned();
        if let Some(disk) = cached {
            return disk;
        }
        let disk: RingCells = Arc::new(origin.grid_disk_distances::<Vec<_>>(k));
        if disk.len() <= MAX_CACHED_DISK_CELLS {
            self.cache.lock().put((origin, k), Arc::clone(&disk));
        }
        disk
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for GridDiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridDiskCache")
            .field("entries", &self.len())
            .finish()
    }
}

/// Spatial index for entity lookups by H3 cell.
///
/// Maintains cell → entity buckets plus the reverse entity → cell map so that moving an
/// entity is a remove-from-old-bucket / insert-into-new-bucket pair. Callers serialise
/// mutations against traversals; the index itself is not synchronised.
#[derive(Debug)]
pub struct SpatialIndex {
    geo: GeoIndex,
    entities_by_cell: HashMap<CellIndex, BTreeSet<String>>,
    entity_to_cell: HashMap<String, CellIndex>,
    disks: GridDiskCache,
}

impl SpatialIndex {
    pub fn new(geo: GeoIndex, disk_cache_capacity: usize) -> Self {
        Self {
            geo,
            entities_by_cell: HashMap::new(),
            entity_to_cell: HashMap::new(),
            disks: GridDiskCache::new(disk_cache_capacity),
        }
    }

    pub fn geo(&self) -> &GeoIndex {
        &self.geo
    }

    /// Place `entity_id` in `cell`, moving it out of its previous cell if needed.
    pub fn upsert(&mut self, entity_id: &str, cell: CellIndex) {
        if let Some(old_cell) = self.entity_to_cell.get(entity_id).copied() {
            if old_cell == cell {
                return;
            }
            self.remove_from_bucket(entity_id, old_cell);
        }
        self.entities_by_cell
            .entry(cell)
            .or_default()
            .insert(entity_id.to_string());
        self.entity_to_cell.insert(entity_id.to_string(), cell);
    }

    /// Remove an entity from the index.
    pub fn remove(&mut self, entity_id: &str) -> Option<CellIndex> {
        let cell = self.entity_to_cell.remove(entity_id)?;
        self.remove_from_bucket(entity_id, cell);
        Some(cell)
    }

    fn remove_from_bucket(&mut self, entity_id: &str, cell: CellIndex) {
        if let Some(entities) = self.entities_by_cell.get_mut(&cell) {
            entities.remove(entity_id);
            if entities.is_empty() {
                self.entities_by_cell.remove(&cell);
            }
        }
    }

    /// Entities currently bucketed in `cell`, in lexical order.
    pub fn entities_in_cell(&self, cell: CellIndex) -> impl Iterator<Item = &str> {
        self.entities_by_cell
            .get(&cell)
            .into_iter()
            .flat_map(|entities| entities.iter().map(String::as_str))
    }

    /// Cells within `k` grid steps of `origin`, tagged with their ring, via the LRU cache.
    pub fn grid_disk(&self, origin: CellIndex, k: u32) -> RingCells {
        debug_assert_eq!(
            origin.resolution(),
            self.geo.resolution(),
            "origin resolution must match the index resolution"
        );
        self.disks.get_or_compute(origin, k)
    }

    pub fn len(&self) -> usize {
        self.entity_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_to_cell.is_empty()
    }

    pub fn occupied_cells(&self) -> usize {
        self.entities_by_cell.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    fn cell_at(lng: f64, lat: f64) -> CellIndex {
        GeoPoint::new(lng, lat)
            .unwrap()
            .to_cell(Resolution::Seven)
            .unwrap()
    }

    #[test]
    fn grid_disk_tags_cells_with_ring_distance() {
        let index = SpatialIndex::new(GeoIndex::default(), 8);
        let origin = cell_at(13.4, 52.5);
        let cells = index.grid_disk(origin, 2);

        assert!(cells.contains(&(origin, 0)));
        assert_eq!(cells.len(), 19);
        for (cell, ring) in cells.iter() {
            let distance = origin.grid_distance(*cell).expect("grid distance");
            assert_eq!(distance as u32, *ring);
        }
    }

    #[test]
    fn moving_an_entity_leaves_no_trace_in_the_old_cell() {
        let mut index = SpatialIndex::new(GeoIndex::default(), 8);
        let first = cell_at(13.4, 52.5);
        let second = cell_at(13.6, 52.4);

        index.upsert("d1", first);
        index.upsert("d1", second);

        assert_eq!(index.entities_in_cell(first).count(), 0);
        assert_eq!(index.entities_in_cell(second).collect::<Vec<_>>(), vec!["d1"]);
        assert_eq!(index.occupied_cells(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_drops_empty_buckets() {
        let mut index = SpatialIndex::new(GeoIndex::default(), 8);
        let cell = cell_at(0.0, 0.0);
        index.upsert("a", cell);
        index.upsert("b", cell);

        assert_eq!(index.remove("a"), Some(cell));
        assert_eq!(index.entities_in_cell(cell).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(index.remove("b"), Some(cell));
        assert_eq!(index.remove("b"), None);
        assert!(index.is_empty());
        assert_eq!(index.occupied_cells(), 0);
    }

    #[test]
    fn ring_bound_covers_the_radius() {
        let geo = GeoIndex::default();
        let rings = geo.rings_for_radius(50_000.0);
        assert!(geo.ring_lower_bound_m(rings + 1) > 50_000.0);
        assert_eq!(geo.ring_lower_bound_m(0), 0.0);
        assert_eq!(geo.ring_lower_bound_m(1), 0.0);
    }

    #[test]
    fn grid_disk_cache_reuses_entries() {
        let cache = GridDiskCache::new(2);
        let origin = cell_at(0.0, 0.0);
        let first = cache.get_or_compute(origin, 3);
        let second = cache.get_or_compute(origin, 3);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn oversized_disks_are_not_cached() {
        let cache = GridDiskCache::new(4);
        let origin = cell_at(0.0, 0.0);
        let disk = cache.get_or_compute(origin, 40);

        assert!(disk.len() > MAX_CACHED_DISK_CELLS);
        assert!(cache.is_empty());
        assert_eq!(disk.len() as u64, grid_disk_cell_count(40));
    }
}
