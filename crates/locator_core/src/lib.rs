//! Proximity-matching core: tracks the current position of every driver and answers
//! "who is the nearest driver to this point" queries joined with directory profiles.
//!
//! Layering, leaf-first:
//!
//! - [`geo`]: validated coordinate pairs and great-circle distance
//! - [`spatial`]: H3 cell buckets and cached grid disks
//! - [`store`]: per-entity location table with an atomically maintained spatial index
//! - [`proximity`]: radius-bounded nearest-neighbour search with deterministic ranking
//! - [`directory`]: profile records owned by the user directory
//! - [`locator`]: the assembler that joins the ranked winner with its profile

pub mod clock;
pub mod config;
pub mod deadline;
pub mod directory;
pub mod error;
pub mod geo;
pub mod locator;
pub mod proximity;
pub mod spatial;
pub mod store;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use config::{LocatorConfig, ProfileMissPolicy, UpdateOrdering};
pub use deadline::Deadline;
pub use directory::{InMemoryUserDirectory, ProfileRecord, UserDirectory};
pub use error::{LocatorError, Result};
pub use geo::GeoPoint;
pub use locator::{FindOutcome, Locator, QueryResult};
pub use proximity::{Candidate, ProximityQuery};
pub use store::{
    InMemoryLocationStore, LocationRecord, LocationStore, LocationUpdate, UpsertOutcome,
};
