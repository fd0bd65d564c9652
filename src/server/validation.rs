//! Request validation utilities for the domainlock API.
//!
//! This module provides validation functions for common input types
//! used across the API endpoints.

use std::fmt;

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use domainlock::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("a.com", "domain").is_ok());
/// assert!(validate_not_empty("", "domain").is_err());
/// assert!(validate_not_empty("   ", "domain").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "cannot be empty".to_string(),
        })
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds.
///
/// # Example
/// ```
/// use domainlock::server::validation::validate_length;
///
/// assert!(validate_length("a.com", 1, 253, "domain").is_ok());
/// assert!(validate_length("", 1, 253, "domain").is_err());
/// ```
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.len();
    if len < min || len > max {
        Err(ValidationError {
            field: field_name.to_string(),
            message: format!("length must be between {min} and {max} characters, got {len}"),
        })
    } else {
        Ok(())
    }
}

/// Validate a domain name.
///
/// Accepts hostnames with optional port (`example.com`, `shop.example.co.id`,
/// `localhost:3000`). This is a plausibility check for audit quality, not a
/// full RFC hostname parser.
pub fn validate_domain(value: &str, field_name: &str) -> ValidationResult<()> {
    let domain_regex = regex::Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?(:\d{1,5})?$")
        .expect("domain regex is valid");

    if domain_regex.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "invalid domain format".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_empty_rejects_whitespace() {
        assert!(validate_not_empty("value", "field").is_ok());
        assert!(validate_not_empty(" \t ", "field").is_err());
    }

    #[test]
    fn length_bounds_are_inclusive() {
        assert!(validate_length("abc", 3, 3, "field").is_ok());
        assert!(validate_length("ab", 3, 3, "field").is_err());
        assert!(validate_length("abcd", 3, 3, "field").is_err());
    }

    #[test]
    fn domain_accepts_common_shapes() {
        assert!(validate_domain("example.com", "domain").is_ok());
        assert!(validate_domain("shop.example.co.id", "domain").is_ok());
        assert!(validate_domain("localhost:3000", "domain").is_ok());
    }

    #[test]
    fn domain_rejects_garbage() {
        assert!(validate_domain("", "domain").is_err());
        assert!(validate_domain("http://example.com", "domain").is_err());
        assert!(validate_domain("exa mple.com", "domain").is_err());
        assert!(validate_domain("-leading.dash", "domain").is_err());
    }

    #[test]
    fn error_display_names_the_field() {
        let err = validate_not_empty("", "licenseKey").unwrap_err();
        assert_eq!(err.to_string(), "licenseKey: cannot be empty");
    }
}
