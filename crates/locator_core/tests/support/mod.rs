#![allow(dead_code)]

use std::sync::Arc;

use locator_core::test_helpers::{point, register_profile};
use locator_core::{
    Deadline, GeoPoint, InMemoryLocationStore, InMemoryUserDirectory, Locator, LocatorConfig,
    LocationStore, LocationUpdate,
};

/// Store, directory, and locator sharing the same backends so tests can poke either side.
pub struct TestWorld {
    pub store: Arc<InMemoryLocationStore>,
    pub directory: Arc<InMemoryUserDirectory>,
    pub locator: Locator,
}

impl TestWorld {
    pub fn new(config: LocatorConfig) -> Self {
        let store = Arc::new(InMemoryLocationStore::new(&config).expect("store"));
        let directory = Arc::new(InMemoryUserDirectory::new());
        let locator = Locator::new(store.clone(), directory.clone(), config).expect("locator");
        Self {
            store,
            directory,
            locator,
        }
    }

    pub fn place(&self, entity_id: &str, longitude: f64, latitude: f64) {
        let update = LocationUpdate::at(entity_id, point(longitude, latitude), 0).expect("update");
        self.store.upsert(update, Deadline::none()).expect("upsert");
    }

    pub fn register(&self, entity_id: &str) {
        register_profile(self.directory.as_ref(), entity_id).expect("register");
    }

    pub fn origin() -> GeoPoint {
        point(0.0, 0.0)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new(LocatorConfig::default())
    }
}
