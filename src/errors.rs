//! Error types shared across the domainlock server.
//!
//! The first five variants are expected business outcomes of the license
//! lifecycle and are returned to callers as structured failure responses,
//! never as HTTP faults. The remaining variants are infrastructure failures:
//! they surface as a generic error to the caller while the underlying cause
//! is logged server-side.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// No license exists for the given key or id.
    #[error("license not found")]
    NotFound,

    /// The license has been administratively deactivated.
    #[error("license key is no longer active")]
    Deactivated,

    /// The license expiry date is in the past.
    #[error("license key has expired")]
    Expired,

    /// The license is bound to a different domain (piracy event).
    #[error("license key is bound to another domain")]
    DomainConflict,

    /// A license with this key already exists (creation only).
    #[error("license key already exists")]
    DuplicateKey,

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The license store or audit log is unavailable.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Outbound delivery (piracy alert webhook) failed.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Convenience alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;

impl LicenseError {
    /// True for the expected business outcomes of activate/verify flows.
    ///
    /// These must never be reported as server faults.
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            LicenseError::NotFound
                | LicenseError::Deactivated
                | LicenseError::Expired
                | LicenseError::DomainConflict
                | LicenseError::DuplicateKey
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_outcomes_are_not_faults() {
        assert!(LicenseError::NotFound.is_business_outcome());
        assert!(LicenseError::DomainConflict.is_business_outcome());
        assert!(LicenseError::DuplicateKey.is_business_outcome());

        assert!(!LicenseError::DatabaseError("down".into()).is_business_outcome());
        assert!(!LicenseError::NetworkError("timeout".into()).is_business_outcome());
    }
}
