//! Admin API handlers for license management.
//!
//! This module provides the administrative collaborator surface around the
//! activation engine: license CRUD, unbind, and reporting. Authentication is
//! deliberately not implemented here — deployments front these routes with
//! their own auth layer.
//!
//! # Endpoints
//!
//! - `POST /api/admin/licenses` - Create a new license (key generated server-side)
//! - `GET /api/admin/licenses` - List licenses with their recent log entries
//! - `GET /api/admin/licenses/{id}` - Get a license with its full log trail
//! - `PATCH /api/admin/licenses/{id}` - Update whitelisted fields
//! - `DELETE /api/admin/licenses/{id}` - Unbind the license from its domain
//! - `GET /api/admin/stats` - Aggregate license counts
//! - `GET /api/admin/piracy` - Recent piracy log entries and suspicious licenses

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::config::get_config;
use crate::errors::LicenseError;
use crate::license_key::{generate_unique_license_key, LicenseKeyConfig};
use crate::package_type::PackageType;
use crate::server::client_api::AppState;
use crate::server::database::{License, LicenseLog, LogAction, NewLicense, NewLogEntry};
use crate::server::validation::validate_not_empty;

/// Number of recent log entries attached to each license in list responses.
const LIST_LOG_PREVIEW: i64 = 3;

/// Maximum log entries returned for a single license.
const LOG_TRAIL_LIMIT: i64 = 100;

/// Maximum entries in the piracy report.
const PIRACY_REPORT_LIMIT: i64 = 100;

/// Retries for generating a key that clears the store's unique constraint.
const KEY_GENERATION_RETRIES: u32 = 5;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a new license.
///
/// The key itself is always generated server-side.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseRequest {
    /// Package type; must be one of the closed enumeration
    pub package_type: String,
    /// License holder name (required)
    pub holder_name: String,
    pub office_name: Option<String>,
    pub holder_email: Option<String>,
    pub holder_phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    /// Optional pre-assigned domain binding
    pub bound_domain: Option<String>,
    /// Expiration date (RFC 3339, or `YYYY-MM-DD` meaning end of that day)
    pub expires_at: Option<String>,
}

/// Request body for updating a license.
///
/// Only the whitelisted fields below can be patched. Omitted fields are left
/// unchanged; nullable fields can be cleared by sending an explicit `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicenseRequest {
    pub package_type: Option<String>,
    pub holder_name: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub office_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub holder_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub holder_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<String>>,
}

/// Distinguish "field absent" from "field explicitly null".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query parameters for listing licenses.
#[derive(Debug, Deserialize)]
pub struct ListLicensesQuery {
    /// Pagination: page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Pagination: items per page
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    50
}

/// Full admin view of a license.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseResponse {
    pub id: String,
    pub key: String,
    pub package_type: String,
    pub holder_name: String,
    pub office_name: Option<String>,
    pub holder_email: Option<String>,
    pub holder_phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub bound_domain: Option<String>,
    pub server_hash: Option<String>,
    pub activated_at: Option<String>,
    pub expires_at: Option<String>,
    pub last_verified: Option<String>,
    pub piracy_attempts: i64,
    pub last_piracy_at: Option<String>,
    pub created_at: String,
}

impl From<License> for LicenseResponse {
    fn from(license: License) -> Self {
        Self {
            id: license.id,
            key: license.key,
            package_type: license.package_type,
            holder_name: license.holder_name,
            office_name: license.office_name,
            holder_email: license.holder_email,
            holder_phone: license.holder_phone,
            address: license.address,
            notes: license.notes,
            is_active: license.is_active,
            bound_domain: license.bound_domain,
            server_hash: license.server_hash,
            activated_at: license.activated_at.map(rfc3339),
            expires_at: license.expires_at.map(rfc3339),
            last_verified: license.last_verified.map(rfc3339),
            piracy_attempts: license.piracy_attempts,
            last_piracy_at: license.last_piracy_at.map(rfc3339),
            created_at: rfc3339(license.created_at),
        }
    }
}

/// Admin view of an audit log entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    pub id: i64,
    pub license_id: String,
    pub action: String,
    pub domain: Option<String>,
    pub server_hash: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: String,
    pub is_piracy: bool,
    pub created_at: String,
}

impl From<LicenseLog> for LogResponse {
    fn from(log: LicenseLog) -> Self {
        Self {
            id: log.id,
            license_id: log.license_id,
            action: log.action,
            domain: log.domain,
            server_hash: log.server_hash,
            ip: log.ip,
            user_agent: log.user_agent,
            details: log.details,
            is_piracy: log.is_piracy,
            created_at: rfc3339(log.created_at),
        }
    }
}

/// A license with a preview of its recent activity.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseWithLogs {
    #[serde(flatten)]
    pub license: LicenseResponse,
    pub recent_logs: Vec<LogResponse>,
}

/// Response for listing licenses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListLicensesResponse {
    pub licenses: Vec<LicenseWithLogs>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Response for a single license with its log trail.
#[derive(Debug, Serialize)]
pub struct GetLicenseResponse {
    pub license: LicenseResponse,
    pub logs: Vec<LogResponse>,
}

/// Response for create/update/unbind operations.
#[derive(Debug, Serialize)]
pub struct LicenseMutationResponse {
    pub success: bool,
    pub license: LicenseResponse,
}

/// Aggregate counts for the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: i64,
    pub active: i64,
    pub bound: i64,
    pub total_piracy_attempts: i64,
    pub by_package: serde_json::Map<String, serde_json::Value>,
    pub piracy_hotspots: Vec<HotspotResponse>,
}

/// A license with recorded piracy attempts, for the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotResponse {
    pub key: String,
    pub holder_name: String,
    pub office_name: Option<String>,
    pub piracy_attempts: i64,
    pub last_piracy_at: Option<String>,
}

impl From<License> for HotspotResponse {
    fn from(license: License) -> Self {
        Self {
            key: license.key,
            holder_name: license.holder_name,
            office_name: license.office_name,
            piracy_attempts: license.piracy_attempts,
            last_piracy_at: license.last_piracy_at.map(rfc3339),
        }
    }
}

/// Response for the piracy report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PiracyReportResponse {
    pub piracy_logs: Vec<LogResponse>,
    pub suspicious_licenses: Vec<SuspiciousLicense>,
}

/// A license ordered into the piracy report by attempt count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousLicense {
    pub id: String,
    pub key: String,
    pub holder_name: String,
    pub office_name: Option<String>,
    pub holder_phone: Option<String>,
    pub bound_domain: Option<String>,
    pub piracy_attempts: i64,
    pub last_piracy_at: Option<String>,
    pub is_active: bool,
}

impl From<License> for SuspiciousLicense {
    fn from(license: License) -> Self {
        Self {
            id: license.id,
            key: license.key,
            holder_name: license.holder_name,
            office_name: license.office_name,
            holder_phone: license.holder_phone,
            bound_domain: license.bound_domain,
            piracy_attempts: license.piracy_attempts,
            last_piracy_at: license.last_piracy_at.map(rfc3339),
            is_active: license.is_active,
        }
    }
}

/// Admin API error type.
#[derive(Debug)]
pub enum AdminError {
    /// License not found
    NotFound(String),
    /// Invalid request data
    BadRequest(String),
    /// Key collision that survived regeneration
    Conflict(String),
    /// Database error
    DatabaseError(String),
    /// Configuration error
    ConfigError(String),
}

impl std::fmt::Display for AdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminError::NotFound(msg) => write!(f, "not found: {msg}"),
            AdminError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            AdminError::Conflict(msg) => write!(f, "conflict: {msg}"),
            AdminError::DatabaseError(msg) => write!(f, "database error: {msg}"),
            AdminError::ConfigError(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for AdminError {}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AdminError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AdminError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AdminError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AdminError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AdminError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

impl From<LicenseError> for AdminError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::NotFound => AdminError::NotFound("license".to_string()),
            LicenseError::DuplicateKey => AdminError::Conflict(err.to_string()),
            LicenseError::ConfigError(msg) => AdminError::ConfigError(msg),
            _ => AdminError::DatabaseError(err.to_string()),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse an expiry date string into NaiveDateTime.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS`, or a bare date (taken as
/// end of that day).
fn parse_datetime(s: &str) -> Result<NaiveDateTime, AdminError> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }

    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(23, 59, 59) {
            return Ok(dt);
        }
    }

    Err(AdminError::BadRequest(format!(
        "invalid datetime '{s}' (expected RFC 3339 or YYYY-MM-DD)"
    )))
}

fn rfc3339(dt: NaiveDateTime) -> String {
    dt.and_utc().to_rfc3339()
}

fn none_if_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new license with a freshly generated key.
pub async fn create_license_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateLicenseRequest>,
) -> Result<Json<LicenseMutationResponse>, AdminError> {
    validate_not_empty(&req.holder_name, "holderName")
        .map_err(|e| AdminError::BadRequest(e.to_string()))?;
    if !PackageType::is_valid(&req.package_type) {
        return Err(AdminError::BadRequest(format!(
            "invalid package type '{}'",
            req.package_type
        )));
    }

    let expires_at = req.expires_at.as_deref().map(parse_datetime).transpose()?;

    let config = get_config().map_err(AdminError::from)?;
    let key_config = LicenseKeyConfig::from(&config.license);

    let db = state.db.clone();
    let key = generate_unique_license_key(
        &key_config,
        |candidate| {
            let db = db.clone();
            async move { db.key_exists(&candidate).await }
        },
        KEY_GENERATION_RETRIES,
    )
    .await
    .map_err(AdminError::from)?;

    let license = state
        .db
        .create_license(NewLicense {
            key,
            package_type: req.package_type,
            holder_name: req.holder_name,
            office_name: none_if_blank(req.office_name),
            holder_email: none_if_blank(req.holder_email),
            holder_phone: none_if_blank(req.holder_phone),
            address: none_if_blank(req.address),
            notes: none_if_blank(req.notes),
            bound_domain: none_if_blank(req.bound_domain),
            expires_at,
        })
        .await
        .map_err(AdminError::from)?;

    info!("Created license {} for {}", license.key, license.holder_name);

    Ok(Json(LicenseMutationResponse {
        success: true,
        license: license.into(),
    }))
}

/// List licenses, newest first, each with a preview of recent log entries.
pub async fn list_licenses_handler(
    State(state): State<AppState>,
    Query(query): Query<ListLicensesQuery>,
) -> Result<Json<ListLicensesResponse>, AdminError> {
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 200);
    let offset = (page - 1) as i64 * per_page as i64;

    let total = state.db.count_licenses().await.map_err(AdminError::from)?;
    let licenses = state
        .db
        .list_licenses(per_page as i64, offset)
        .await
        .map_err(AdminError::from)?;

    let mut out = Vec::with_capacity(licenses.len());
    for license in licenses {
        let logs = state
            .db
            .logs_for_license(&license.id, LIST_LOG_PREVIEW)
            .await
            .map_err(AdminError::from)?;
        out.push(LicenseWithLogs {
            license: license.into(),
            recent_logs: logs.into_iter().map(LogResponse::from).collect(),
        });
    }

    Ok(Json(ListLicensesResponse {
        licenses: out,
        total,
        page,
        per_page,
    }))
}

/// Get a license by id, with its full audit trail.
pub async fn get_license_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GetLicenseResponse>, AdminError> {
    let license = state
        .db
        .get_license_by_id(&id)
        .await
        .map_err(AdminError::from)?
        .ok_or_else(|| AdminError::NotFound(format!("license {id}")))?;

    let logs = state
        .db
        .logs_for_license(&id, LOG_TRAIL_LIMIT)
        .await
        .map_err(AdminError::from)?;

    Ok(Json(GetLicenseResponse {
        license: license.into(),
        logs: logs.into_iter().map(LogResponse::from).collect(),
    }))
}

/// Patch the whitelisted fields of a license.
///
/// Binding state and piracy counters are not patchable — those belong to the
/// activation engine and the unbind operation.
pub async fn update_license_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLicenseRequest>,
) -> Result<Json<LicenseMutationResponse>, AdminError> {
    let mut license = state
        .db
        .get_license_by_id(&id)
        .await
        .map_err(AdminError::from)?
        .ok_or_else(|| AdminError::NotFound(format!("license {id}")))?;

    if let Some(package_type) = req.package_type {
        if !PackageType::is_valid(&package_type) {
            return Err(AdminError::BadRequest(format!(
                "invalid package type '{package_type}'"
            )));
        }
        license.package_type = package_type;
    }
    if let Some(holder_name) = req.holder_name {
        validate_not_empty(&holder_name, "holderName")
            .map_err(|e| AdminError::BadRequest(e.to_string()))?;
        license.holder_name = holder_name;
    }
    if let Some(is_active) = req.is_active {
        license.is_active = is_active;
    }
    if let Some(office_name) = req.office_name {
        license.office_name = none_if_blank(office_name);
    }
    if let Some(holder_email) = req.holder_email {
        license.holder_email = none_if_blank(holder_email);
    }
    if let Some(holder_phone) = req.holder_phone {
        license.holder_phone = none_if_blank(holder_phone);
    }
    if let Some(address) = req.address {
        license.address = none_if_blank(address);
    }
    if let Some(notes) = req.notes {
        license.notes = none_if_blank(notes);
    }
    if let Some(expires_at) = req.expires_at {
        license.expires_at = expires_at.as_deref().map(parse_datetime).transpose()?;
    }

    let updated = state
        .db
        .update_license_details(&license)
        .await
        .map_err(AdminError::from)?;
    if !updated {
        return Err(AdminError::NotFound(format!("license {id}")));
    }

    info!("Updated license {}", license.key);

    Ok(Json(LicenseMutationResponse {
        success: true,
        license: license.into(),
    }))
}

/// Unbind a license from its domain.
///
/// Clears the binding (`bound_domain`, `server_hash`, `activated_at`) and
/// logs an `unbind` action. The piracy counter is kept — it is forensic
/// history and survives rebinding.
pub async fn unbind_license_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseMutationResponse>, AdminError> {
    let license = state
        .db
        .get_license_by_id(&id)
        .await
        .map_err(AdminError::from)?
        .ok_or_else(|| AdminError::NotFound(format!("license {id}")))?;

    let previous_domain = license.bound_domain.clone();

    let updated = state
        .db
        .unbind_license(&id)
        .await
        .map_err(AdminError::from)?;
    if !updated {
        return Err(AdminError::NotFound(format!("license {id}")));
    }

    let entry = NewLogEntry {
        license_id: id.clone(),
        action: LogAction::Unbind,
        domain: None,
        server_hash: None,
        ip: None,
        user_agent: None,
        details: format!(
            "Domain unbound by admin. Previous: {}",
            previous_domain.as_deref().unwrap_or("none")
        ),
        is_piracy: false,
    };
    if let Err(e) = state.db.append_log(entry).await {
        warn!("Audit log write failed for unbind of {}: {e}", license.key);
    }

    info!(
        "Unbound license {} (previous domain: {})",
        license.key,
        previous_domain.as_deref().unwrap_or("none")
    );

    let mut license = license;
    license.bound_domain = None;
    license.server_hash = None;
    license.activated_at = None;

    Ok(Json(LicenseMutationResponse {
        success: true,
        license: license.into(),
    }))
}

/// Aggregate counts for the dashboard.
pub async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AdminError> {
    let stats = state.db.license_stats().await.map_err(AdminError::from)?;
    let hotspots = state
        .db
        .piracy_hotspots(5)
        .await
        .map_err(AdminError::from)?;

    let mut by_package = serde_json::Map::new();
    for entry in stats.by_package {
        by_package.insert(entry.package_type, serde_json::json!(entry.count));
    }

    Ok(Json(StatsResponse {
        total: stats.total,
        active: stats.active,
        bound: stats.bound,
        total_piracy_attempts: stats.total_piracy_attempts,
        by_package,
        piracy_hotspots: hotspots.into_iter().map(HotspotResponse::from).collect(),
    }))
}

/// Recent piracy log entries plus licenses ordered by attempt count.
pub async fn piracy_report_handler(
    State(state): State<AppState>,
) -> Result<Json<PiracyReportResponse>, AdminError> {
    let logs = state
        .db
        .recent_piracy_logs(PIRACY_REPORT_LIMIT)
        .await
        .map_err(AdminError::from)?;
    let suspicious = state
        .db
        .piracy_hotspots(PIRACY_REPORT_LIMIT)
        .await
        .map_err(AdminError::from)?;

    Ok(Json(PiracyReportResponse {
        piracy_logs: logs.into_iter().map(LogResponse::from).collect(),
        suspicious_licenses: suspicious
            .into_iter()
            .map(SuspiciousLicense::from)
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_datetime_accepts_rfc3339() {
        let dt = parse_datetime("2026-12-31T23:59:59+00:00").unwrap();
        assert_eq!(dt.to_string(), "2026-12-31 23:59:59");
    }

    #[test]
    fn parse_datetime_accepts_bare_date_as_end_of_day() {
        let dt = parse_datetime("2026-12-31").unwrap();
        assert_eq!(dt.to_string(), "2026-12-31 23:59:59");
    }

    #[test]
    fn parse_datetime_rejects_garbage() {
        assert!(parse_datetime("next tuesday").is_err());
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let req: UpdateLicenseRequest = serde_json::from_str(r#"{"notes": null}"#).unwrap();
        assert_eq!(req.notes, Some(None));
        assert_eq!(req.office_name, None);

        let req: UpdateLicenseRequest =
            serde_json::from_str(r#"{"notes": "renewed 2026"}"#).unwrap();
        assert_eq!(req.notes, Some(Some("renewed 2026".to_string())));
    }

    #[test]
    fn blank_strings_are_stored_as_null() {
        assert_eq!(none_if_blank(Some("   ".to_string())), None);
        assert_eq!(none_if_blank(Some(String::new())), None);
        assert_eq!(
            none_if_blank(Some("Office".to_string())),
            Some("Office".to_string())
        );
        assert_eq!(none_if_blank(None), None);
    }
}
