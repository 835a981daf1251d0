//! Error types for the locator core.

use thiserror::Error;

/// Failures surfaced by the store, the directory, and the assembler.
///
/// "No driver nearby" is a normal outcome
/// ([`crate::FindOutcome::NoDriverNearby`]), not an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    /// Malformed coordinates or an empty identity; rejected before touching any store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The ranked winner has no profile in the user directory.
    #[error("profile not found for entity '{entity_id}'")]
    ProfileNotFound { entity_id: String },

    /// The location backend could not serve the request.
    #[error("location store unavailable: {0}")]
    StoreUnavailable(String),

    /// The user directory backend could not serve the request.
    #[error("user directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The caller's deadline passed before the operation could start.
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded { operation: &'static str },
}

impl LocatorError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Transient failures the caller may retry as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::DirectoryUnavailable(_)
                | Self::DeadlineExceeded { .. }
        )
    }

    /// Stable machine-readable code used in response envelopes and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::ProfileNotFound { .. } => "profile_not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::DirectoryUnavailable(_) => "directory_unavailable",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}

/// Result type for locator operations.
pub type Result<T> = std::result::Result<T, LocatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_and_deadline_failures_are_retryable() {
        assert!(LocatorError::StoreUnavailable("down".into()).is_retryable());
        assert!(LocatorError::DirectoryUnavailable("down".into()).is_retryable());
        assert!(LocatorError::DeadlineExceeded { operation: "upsert" }.is_retryable());
        assert!(!LocatorError::invalid_input("bad").is_retryable());
        assert!(!LocatorError::ProfileNotFound {
            entity_id: "d1".into()
        }
        .is_retryable());
    }

    #[test]
    fn display_names_the_missing_entity() {
        let error = LocatorError::ProfileNotFound {
            entity_id: "driver-7".to_string(),
        };
        assert_eq!(error.to_string(), "profile not found for entity 'driver-7'");
        assert_eq!(error.code(), "profile_not_found");
    }
}
