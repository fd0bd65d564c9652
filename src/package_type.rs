//! Package type vocabulary for licenses.
//!
//! A license carries exactly one package type out of a closed set. The server
//! treats the value as opaque entitlement data — it only validates membership
//! at the admin edge and echoes the value back to verifying clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of license packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    /// Full product, all features.
    Complete,
    /// Product without AI features.
    NoAi,
    /// Product with a reduced AI quota.
    LimitedAi,
}

impl PackageType {
    /// All valid package types, for validation error messages.
    pub const ALL: [PackageType; 3] = [
        PackageType::Complete,
        PackageType::NoAi,
        PackageType::LimitedAi,
    ];

    /// Wire/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Complete => "complete",
            PackageType::NoAi => "no_ai",
            PackageType::LimitedAi => "limited_ai",
        }
    }

    /// Check whether a raw string names a valid package type.
    pub fn is_valid(value: &str) -> bool {
        value.parse::<PackageType>().is_ok()
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(PackageType::Complete),
            "no_ai" => Ok(PackageType::NoAi),
            "limited_ai" => Ok(PackageType::LimitedAi),
            other => Err(format!(
                "invalid package type '{other}' (expected one of: complete, no_ai, limited_ai)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_packages() {
        assert_eq!("complete".parse::<PackageType>(), Ok(PackageType::Complete));
        assert_eq!("no_ai".parse::<PackageType>(), Ok(PackageType::NoAi));
        assert_eq!(
            "limited_ai".parse::<PackageType>(),
            Ok(PackageType::LimitedAi)
        );
    }

    #[test]
    fn parse_rejects_unknown_packages() {
        assert!("premium".parse::<PackageType>().is_err());
        assert!("".parse::<PackageType>().is_err());
        assert!("Complete".parse::<PackageType>().is_err());
    }

    #[test]
    fn round_trips_through_as_str() {
        for package in PackageType::ALL {
            assert_eq!(package.as_str().parse::<PackageType>(), Ok(package));
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&PackageType::LimitedAi).unwrap();
        assert_eq!(json, r#""limited_ai""#);
        let back: PackageType = serde_json::from_str(r#""no_ai""#).unwrap();
        assert_eq!(back, PackageType::NoAi);
    }
}
