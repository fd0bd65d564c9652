//! License key generation, canonicalization, and masking.
//!
//! This module provides functions for generating and validating human-readable license keys
//! in the format `PREFIX-XXXX-XXXX-XXXX-XXXX`.
//!
//! # Features
//!
//! - Configurable prefix (e.g., "NTRS", "LIC")
//! - Configurable number of segments and segment length
//! - Excludes ambiguous characters (0, O, I, L, 1) for readability
//! - Canonicalization for case-insensitive lookup (trim + uppercase)
//! - Format-preserving masking for alert payloads
//!
//! The generator makes no uniqueness promise: uniqueness is enforced by the
//! store's unique constraint on `key`, and [`generate_unique_license_key`]
//! retries against it a bounded number of times.

use rand::Rng;

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Character set for license key generation.
/// Excludes ambiguous characters: 0, O, I, L, 1
const LICENSE_KEY_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Configuration for license key generation.
/// This is a convenience wrapper that can be constructed from `LicenseConfig`.
#[derive(Debug, Clone)]
pub struct LicenseKeyConfig {
    /// Prefix for the license key (e.g., "NTRS")
    pub prefix: String,
    /// Number of segments after the prefix
    pub segments: u8,
    /// Length of each segment
    pub segment_length: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "NTRS".to_string(),
            segments: 4,
            segment_length: 4,
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

/// Canonical form of a license key as presented by a client.
///
/// Lookups are case-insensitive: keys are stored uppercase and incoming keys
/// are trimmed and uppercased before hitting the store.
pub fn canonicalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Mask a license key for alert payloads.
///
/// Keeps the prefix, the first, and the last segment visible; middle segments
/// are replaced with a fixed mask:
///
/// `NTRS-AB12-CD34-EF56-GH78` → `NTRS-AB12-****-****-GH78`
///
/// Keys with fewer than five segments degrade to the first eight characters
/// followed by `****`.
pub fn mask_license_key(key: &str) -> String {
    let parts: Vec<&str> = key.split('-').collect();
    if parts.len() >= 5 {
        return format!(
            "{}-{}-****-****-{}",
            parts[0],
            parts[1],
            parts[parts.len() - 1]
        );
    }

    let visible: String = key.chars().take(8).collect();
    format!("{visible}****")
}

/// Generate a single segment of random characters.
fn generate_segment(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_CHARSET.len());
            LICENSE_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a license key with the given configuration.
///
/// # Format
///
/// The generated key follows the format: `PREFIX-XXXX-XXXX-XXXX-XXXX`
/// where:
/// - `PREFIX` is the configured prefix
/// - Each `XXXX` is a segment of random characters
/// - The number of segments and their length are configurable
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let segments: Vec<String> = (0..config.segments)
        .map(|_| generate_segment(config.segment_length))
        .collect();

    format!("{}-{}", config.prefix, segments.join("-"))
}

/// Validate that a license key matches the expected format.
///
/// This validates:
/// - The key starts with the expected prefix
/// - The key has the correct number of segments
/// - Each segment has the correct length
/// - All characters in segments are from the valid character set
pub fn validate_license_key_format(key: &str, config: &LicenseKeyConfig) -> bool {
    if !key.starts_with(&config.prefix) {
        return false;
    }

    let parts: Vec<&str> = key.split('-').collect();

    // Expected: prefix + N segments
    let expected_parts = 1 + config.segments as usize;
    if parts.len() != expected_parts {
        return false;
    }

    if parts[0] != config.prefix {
        return false;
    }

    for segment in &parts[1..] {
        if segment.len() != config.segment_length as usize {
            return false;
        }

        for ch in segment.chars() {
            if !LICENSE_KEY_CHARSET.contains(&(ch as u8)) {
                return false;
            }
        }
    }

    true
}

/// Generate a unique license key, checking against existing keys.
///
/// This function generates keys until it finds one that doesn't exist in the database.
/// It will retry up to `max_retries` times before giving up.
///
/// # Arguments
///
/// * `config` - License key configuration
/// * `exists_fn` - An async function that checks if a key already exists
/// * `max_retries` - Maximum number of generation attempts
///
/// # Errors
///
/// Returns an error if a unique key cannot be generated within the retry limit.
pub async fn generate_unique_license_key<F, Fut>(
    config: &LicenseKeyConfig,
    exists_fn: F,
    max_retries: u32,
) -> LicenseResult<String>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = LicenseResult<bool>>,
{
    for _ in 0..max_retries {
        let key = generate_license_key(config);
        if !exists_fn(key.clone()).await? {
            return Ok(key);
        }
    }

    Err(LicenseError::DatabaseError(format!(
        "failed to generate unique license key after {max_retries} attempts"
    )))
}
