//! Result assembly: joins the ranked winner of a proximity query with its directory profile.
//!
//! The [`Locator`] owns explicit handles to the location store and the user directory; both
//! are injected at construction and shared behind `Arc`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{LocatorConfig, ProfileMissPolicy};
use crate::deadline::Deadline;
use crate::directory::{ProfileRecord, UserDirectory};
use crate::error::{LocatorError, Result};
use crate::geo::GeoPoint;
use crate::proximity::{Candidate, ProximityQuery};
use crate::store::{LocationStore, LocationUpdate, UpsertOutcome};

/// The outward-facing answer to "who is the nearest driver".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub entity_id: String,
    pub display_name: String,
    pub contact_email: String,
    pub position: GeoPoint,
    pub distance_m: f64,
}

impl QueryResult {
    fn assemble(candidate: Candidate, profile: ProfileRecord) -> Self {
        Self {
            entity_id: candidate.entity_id,
            display_name: profile.display_name,
            contact_email: profile.contact_email,
            position: candidate.position,
            distance_m: candidate.distance_m,
        }
    }
}

/// Outcome of a nearest-driver query. An empty neighbourhood is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FindOutcome {
    Found(QueryResult),
    NoDriverNearby,
}

impl FindOutcome {
    pub fn found(self) -> Option<QueryResult> {
        match self {
            Self::Found(result) => Some(result),
            Self::NoDriverNearby => None,
        }
    }
}

pub struct Locator {
    store: Arc<dyn LocationStore>,
    directory: Arc<dyn UserDirectory>,
    config: LocatorConfig,
}

impl Locator {
    pub fn new(
        store: Arc<dyn LocationStore>,
        directory: Arc<dyn UserDirectory>,
        config: LocatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            directory,
            config,
        })
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Ingest one location report (upsert by entity id).
    pub fn record_location(
        &self,
        entity_id: &str,
        longitude: f64,
        latitude: f64,
        timestamp_ms: i64,
        deadline: Deadline,
    ) -> Result<UpsertOutcome> {
        let update = LocationUpdate::new(entity_id, longitude, latitude, timestamp_ms)?;
        let entity_id = update.entity_id.clone();
        let outcome = self.store.upsert(update, deadline)?;
        debug!(
            component = "locator",
            entity_id = %entity_id,
            longitude,
            latitude,
            timestamp_ms,
            outcome = ?outcome,
            "location_recorded"
        );
        Ok(outcome)
    }

    /// Register or refresh a user's profile in the directory.
    pub fn register_user_login(&self, profile: ProfileRecord, deadline: Deadline) -> Result<()> {
        if deadline.is_expired() {
            return Err(LocatorError::DeadlineExceeded {
                operation: "register_user_login",
            });
        }
        let entity_id = profile.entity_id.clone();
        self.directory.upsert_profile(profile)?;
        info!(component = "locator", entity_id = %entity_id, "user_login_registered");
        Ok(())
    }

    /// Nearest driver within the configured default radius.
    pub fn find_nearest_driver(&self, point: GeoPoint, deadline: Deadline) -> Result<FindOutcome> {
        self.find_nearest_with_profile(point, self.config.search_radius_m, deadline)
    }

    /// Nearest driver within `max_radius_m`, joined with its directory profile.
    ///
    /// The store's lock is released by the time `nearest` returns, so the directory lookup
    /// never blocks location updates.
    pub fn find_nearest_with_profile(
        &self,
        point: GeoPoint,
        max_radius_m: f64,
        deadline: Deadline,
    ) -> Result<FindOutcome> {
        let pool = match self.config.profile_miss_policy {
            ProfileMissPolicy::Fail => 1,
            ProfileMissPolicy::SkipUnregistered => self.config.candidate_pool,
        };
        let query = ProximityQuery::new(point, max_radius_m, pool);
        let candidates = self.store.nearest(&query, deadline)?;

        let Some(winner_id) = candidates.first().map(|c| c.entity_id.clone()) else {
            debug!(component = "locator", %point, max_radius_m, "no_driver_nearby");
            return Ok(FindOutcome::NoDriverNearby);
        };

        for candidate in candidates {
            if deadline.is_expired() {
                return Err(LocatorError::DeadlineExceeded {
                    operation: "directory_lookup",
                });
            }
            match self.directory.lookup(&candidate.entity_id)? {
                Some(profile) => {
                    debug!(
                        component = "locator",
                        entity_id = %candidate.entity_id,
                        distance_m = candidate.distance_m,
                        "nearest_driver_found"
                    );
                    return Ok(FindOutcome::Found(QueryResult::assemble(candidate, profile)));
                }
                None if self.config.profile_miss_policy == ProfileMissPolicy::SkipUnregistered => {
                    debug!(
                        component = "locator",
                        entity_id = %candidate.entity_id,
                        "unregistered_candidate_skipped"
                    );
                }
                None => break,
            }
        }

        warn!(component = "locator", entity_id = %winner_id, "profile_not_found");
        Err(LocatorError::ProfileNotFound {
            entity_id: winner_id,
        })
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryUserDirectory;
    use crate::store::InMemoryLocationStore;

    fn locator(config: LocatorConfig) -> Locator {
        let store = Arc::new(InMemoryLocationStore::new(&config).unwrap());
        Locator::new(store, Arc::new(InMemoryUserDirectory::new()), config).unwrap()
    }

    fn register(locator: &Locator, id: &str) {
        let profile = ProfileRecord::new(id, id, &format!("{id}@example.com"), 0).unwrap();
        locator.register_user_login(profile, Deadline::none()).unwrap();
    }

    #[test]
    fn skip_unregistered_falls_through_to_next_candidate() {
        let config = LocatorConfig::default()
            .with_profile_miss_policy(ProfileMissPolicy::SkipUnregistered)
            .with_candidate_pool(3);
        let locator = locator(config);
        locator
            .record_location("ghost", 0.0, 0.0, 1, Deadline::none())
            .unwrap();
        locator
            .record_location("known", 0.01, 0.0, 1, Deadline::none())
            .unwrap();
        register(&locator, "known");

        let result = locator
            .find_nearest_driver(GeoPoint::new(0.0, 0.0).unwrap(), Deadline::none())
            .unwrap()
            .found()
            .expect("driver");
        assert_eq!(result.entity_id, "known");
    }

    #[test]
    fn skip_unregistered_reports_the_winner_when_nobody_is_registered() {
        let config = LocatorConfig::default()
            .with_profile_miss_policy(ProfileMissPolicy::SkipUnregistered)
            .with_candidate_pool(2);
        let locator = locator(config);
        locator
            .record_location("a", 0.0, 0.0, 1, Deadline::none())
            .unwrap();
        locator
            .record_location("b", 0.01, 0.0, 1, Deadline::none())
            .unwrap();

        let error = locator
            .find_nearest_driver(GeoPoint::new(0.0, 0.0).unwrap(), Deadline::none())
            .unwrap_err();
        assert_eq!(
            error,
            LocatorError::ProfileNotFound {
                entity_id: "a".to_string()
            }
        );
    }

    #[test]
    fn invalid_coordinates_never_reach_the_store() {
        let config = LocatorConfig::default();
        let store = Arc::new(InMemoryLocationStore::new(&config).unwrap());
        let locator = Locator::new(
            Arc::clone(&store) as Arc<dyn LocationStore>,
            Arc::new(InMemoryUserDirectory::new()),
            config,
        )
        .unwrap();
        let error = locator
            .record_location("d1", 181.0, 0.0, 1, Deadline::none())
            .unwrap_err();
        assert!(matches!(error, LocatorError::InvalidInput(_)));
        assert!(store.is_empty().unwrap());
    }
}
