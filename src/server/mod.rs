// src/server/mod.rs

//! Server-side components for domainlock.
//!
//! This module contains:
//! - `database`   → DB abstraction over SQLite/Postgres (license store + audit log)
//! - `client_api` → Axum HTTP handlers for activate/verify (the state machine)
//! - `admin`      → Admin API for license CRUD, unbind, and reporting
//! - `notify`     → Piracy alert delivery backends
//! - `routes`     → Router builder
//! - `validation` → Request validation utilities
//! - `logging`    → Request logging middleware + health endpoint

pub mod admin;
pub mod client_api;
pub mod database;
pub mod logging;
pub mod notify;
pub mod routes;
pub mod validation;

// Convenient re-exports so callers can do `domainlock::server::X`
// instead of digging into submodules.

pub use client_api::{
    activate_handler, verify_handler, ActivateRequest, ActivateResponse, AppState, ClientError,
    ClientErrorCode, LicenseSummary, VerifyRequest, VerifyResponse,
};
pub use database::{
    Database, License, LicenseLog, LicenseStats, LogAction, NewLicense, NewLogEntry, PackageCount,
};
pub use notify::{PiracyAlert, PiracyNotifier};
pub use routes::build_router;

pub use admin::{
    create_license_handler, get_license_handler, list_licenses_handler, piracy_report_handler,
    stats_handler, unbind_license_handler, update_license_handler, AdminError,
    CreateLicenseRequest, GetLicenseResponse, LicenseMutationResponse, ListLicensesResponse,
    PiracyReportResponse, StatsResponse, UpdateLicenseRequest,
};

pub use validation::{
    validate_domain, validate_length, validate_not_empty, ValidationError, ValidationResult,
};

pub use logging::{health_handler, request_logging_middleware, HealthResponse, REQUEST_ID_HEADER};
