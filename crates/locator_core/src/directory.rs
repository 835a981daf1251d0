//! User directory: profile records keyed by the same identity space as locations.
//!
//! The locator only reads from the directory when assembling results; registration is the
//! directory's own write path.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::normalize_entity_id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub entity_id: String,
    pub display_name: String,
    pub contact_email: String,
    /// Epoch milliseconds of the most recent login.
    pub last_login_ms: i64,
}

impl ProfileRecord {
    /// Validate and normalise a registration.
    pub fn new(
        entity_id: &str,
        display_name: &str,
        contact_email: &str,
        last_login_ms: i64,
    ) -> Result<Self> {
        Ok(Self {
            entity_id: normalize_entity_id(entity_id)?,
            display_name: display_name.trim().to_string(),
            contact_email: contact_email.trim().to_string(),
            last_login_ms,
        })
    }
}

/// Backend owning profile records. Implementations manage their own concurrency.
pub trait UserDirectory: Send + Sync {
    /// Insert or replace the profile for `profile.entity_id`.
    fn upsert_profile(&self, profile: ProfileRecord) -> Result<()>;

    fn lookup(&self, entity_id: &str) -> Result<Option<ProfileRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    profiles: RwLock<HashMap<String, ProfileRecord>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn upsert_profile(&self, profile: ProfileRecord) -> Result<()> {
        self.profiles
            .write()
            .insert(profile.entity_id.clone(), profile);
        Ok(())
    }

    fn lookup(&self, entity_id: &str) -> Result<Option<ProfileRecord>> {
        Ok(self.profiles.read().get(entity_id.trim()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_replaces_existing_profile() {
        let directory = InMemoryUserDirectory::new();
        directory
            .upsert_profile(ProfileRecord::new("d1", "Ada", "ada@example.com", 1).unwrap())
            .unwrap();
        directory
            .upsert_profile(ProfileRecord::new("d1", " Ada L. ", "ada@example.com", 2).unwrap())
            .unwrap();

        let profile = directory.lookup("d1").unwrap().expect("profile");
        assert_eq!(profile.display_name, "Ada L.");
        assert_eq!(profile.last_login_ms, 2);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn lookup_miss_is_none() {
        let directory = InMemoryUserDirectory::new();
        assert!(directory.lookup("ghost").unwrap().is_none());
        assert!(ProfileRecord::new("", "x", "y", 0).is_err());
    }
}
