//! domainlock - a domain-bound software license server
//!
//! Licenses are opaque, human-typeable keys bound to at most one domain.
//! Deployed application instances call `activate` once at install time and
//! `verify` periodically afterwards; a mismatch between the bound domain and
//! the calling domain is counted, audit-logged, and (on activation) alerted
//! out-of-band.
//!
//! # Features
//!
//! Database backends are selected via feature flags:
//!
//! - `sqlite` - SQLite backend. Enabled by default.
//! - `postgres` - PostgreSQL backend.
//!
//! # Example
//!
//! ```toml
//! # Use the default SQLite backend
//! domainlock = { git = "https://github.com/dmriding/domainlock" }
//!
//! # PostgreSQL backend
//! domainlock = { git = "https://github.com/dmriding/domainlock", default-features = false, features = ["postgres"] }
//! ```

pub mod config;
pub mod errors;
pub mod license_key;
pub mod package_type;
pub mod server;
