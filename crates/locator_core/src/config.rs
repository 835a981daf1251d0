//! Locator configuration: search radius, index granularity, and consistency policies.

use h3o::Resolution;
use serde::{Deserialize, Serialize};

use crate::error::{LocatorError, Result};

/// Default search radius in metres (50 km).
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 50_000.0;

/// Default H3 resolution for the location index (~1.4 km hexagon edge).
pub const DEFAULT_H3_RESOLUTION: u8 = 7;

/// Default capacity of the grid disk LRU cache.
pub const DEFAULT_GRID_DISK_CACHE_CAPACITY: usize = 1_000;

/// What to do when the ranked winner has no directory profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileMissPolicy {
    /// Fail the request with `ProfileNotFound` for the rank-0 candidate.
    #[default]
    Fail,
    /// Walk the candidate pool and return the first candidate with a profile.
    SkipUnregistered,
}

/// How concurrent or out-of-order updates for the same entity are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrdering {
    /// The update that reaches the store last wins, whatever its timestamp.
    #[default]
    LastWriteWins,
    /// Updates older than the stored record are ignored.
    RejectStale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Radius used by `find_nearest_driver` when the caller gives none.
    pub search_radius_m: f64,
    /// H3 resolution (0-15) of the spatial index.
    pub h3_resolution: u8,
    /// Number of ranked candidates fetched per nearest-driver query.
    pub candidate_pool: usize,
    pub profile_miss_policy: ProfileMissPolicy,
    pub update_ordering: UpdateOrdering,
    /// Exclude records older than this from query results. `None` keeps every record visible.
    pub max_location_age_ms: Option<u64>,
    pub grid_disk_cache_capacity: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
            h3_resolution: DEFAULT_H3_RESOLUTION,
            candidate_pool: 1,
            profile_miss_policy: ProfileMissPolicy::default(),
            update_ordering: UpdateOrdering::default(),
            max_location_age_ms: None,
            grid_disk_cache_capacity: DEFAULT_GRID_DISK_CACHE_CAPACITY,
        }
    }
}

impl LocatorConfig {
    pub fn with_search_radius_m(mut self, radius_m: f64) -> Self {
        self.search_radius_m = radius_m;
        self
    }

    pub fn with_h3_resolution(mut self, resolution: u8) -> Self {
        self.h3_resolution = resolution;
        self
    }

    pub fn with_candidate_pool(mut self, pool: usize) -> Self {
        self.candidate_pool = pool;
        self
    }

    pub fn with_profile_miss_policy(mut self, policy: ProfileMissPolicy) -> Self {
        self.profile_miss_policy = policy;
        self
    }

    pub fn with_update_ordering(mut self, ordering: UpdateOrdering) -> Self {
        self.update_ordering = ordering;
        self
    }

    pub fn with_max_location_age_ms(mut self, max_age_ms: u64) -> Self {
        self.max_location_age_ms = Some(max_age_ms);
        self
    }

    pub fn with_grid_disk_cache_capacity(mut self, capacity: usize) -> Self {
        self.grid_disk_cache_capacity = capacity;
        self
    }

    /// Parsed H3 resolution.
    pub fn resolution(&self) -> Result<Resolution> {
        Resolution::try_from(self.h3_resolution).map_err(|_| {
            LocatorError::invalid_input(format!(
                "h3_resolution must be within 0..=15, got {}",
                self.h3_resolution
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.search_radius_m.is_finite() || self.search_radius_m <= 0.0 {
            return Err(LocatorError::invalid_input(
                "search_radius_m must be a positive number of metres",
            ));
        }
        self.resolution()?;
        if self.candidate_pool == 0 {
            return Err(LocatorError::invalid_input(
                "candidate_pool must be a positive integer",
            ));
        }
        if self.grid_disk_cache_capacity == 0 {
            return Err(LocatorError::invalid_input(
                "grid_disk_cache_capacity must be a positive integer",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = LocatorConfig::default();
        assert_eq!(config.search_radius_m, 50_000.0);
        assert_eq!(config.resolution().unwrap(), Resolution::Seven);
        assert_eq!(config.profile_miss_policy, ProfileMissPolicy::Fail);
        assert_eq!(config.update_ordering, UpdateOrdering::LastWriteWins);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(LocatorConfig::default()
            .with_search_radius_m(0.0)
            .validate()
            .is_err());
        assert!(LocatorConfig::default()
            .with_h3_resolution(16)
            .validate()
            .is_err());
        assert!(LocatorConfig::default()
            .with_candidate_pool(0)
            .validate()
            .is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let json = r#"{"search_radius_m": 10000.0, "update_ordering": "reject_stale"}"#;
        let config: LocatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.search_radius_m, 10_000.0);
        assert_eq!(config.update_ordering, UpdateOrdering::RejectStale);
        assert_eq!(config.h3_resolution, DEFAULT_H3_RESOLUTION);
    }
}
