//! Client API endpoints for license activation and verification.
//!
//! These endpoints are called by deployed application instances: `activate`
//! once at install time, `verify` periodically afterwards. They do not
//! require authentication.
//!
//! # Endpoints
//!
//! - `POST /api/licenses/activate` - Bind a license to the calling domain
//! - `POST /api/licenses/verify` - Check that a license is still valid for a domain
//!
//! The two paths deliberately differ on a domain mismatch: both count the
//! attempt and write a piracy log entry, but only `activate` delivers an
//! out-of-band alert, and only `activate` logs deactivated/expired
//! rejections. Verification reports business failures with HTTP 200 and
//! `valid: false`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::LicenseError;
use crate::license_key::{canonicalize_key, mask_license_key};
use crate::server::database::{Database, License, LogAction, NewLogEntry};
use crate::server::notify::{PiracyAlert, PiracyNotifier};
use crate::server::validation::{validate_domain, validate_length, validate_not_empty};

/// Shared application state for handlers.
///
/// Wraps the database and the piracy alert channel; handlers never talk to
/// either directly outside this state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub notifier: Arc<PiracyNotifier>,
}

/// Error codes for client API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientErrorCode {
    /// License key not found
    LicenseNotFound,
    /// License has been administratively deactivated
    LicenseInactive,
    /// License is expired
    LicenseExpired,
    /// License is bound to a different domain
    DomainConflict,
    /// Invalid request format
    InvalidRequest,
    /// Internal server error
    InternalError,
}

/// Client API error response.
#[derive(Debug, Serialize)]
pub struct ClientError {
    pub success: bool,
    pub error: ClientErrorCode,
    pub message: String,
}

impl ClientError {
    pub fn new(code: ClientErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: code,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error {
            ClientErrorCode::LicenseNotFound => StatusCode::NOT_FOUND,
            ClientErrorCode::LicenseInactive => StatusCode::FORBIDDEN,
            ClientErrorCode::LicenseExpired => StatusCode::FORBIDDEN,
            ClientErrorCode::DomainConflict => StatusCode::FORBIDDEN,
            ClientErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ClientErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to activate a license on a domain.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    /// The human-readable license key (e.g., "NTRS-XXXX-XXXX-XXXX-XXXX")
    pub license_key: String,
    /// Fully qualified domain the application is installed on
    pub domain: String,
    /// Optional opaque server fingerprint, stored for forensics
    #[serde(default)]
    pub server_hash: Option<String>,
}

/// Response from a successful activation.
#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub success: bool,
    pub license: LicenseSummary,
}

/// Sanitized license summary returned to the activating client.
///
/// Deliberately excludes the internal id and the stored server hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSummary {
    pub key: String,
    pub package_type: String,
    pub holder_name: String,
    pub office_name: Option<String>,
    pub domain: String,
    pub expires_at: Option<String>,
    pub activated_at: Option<String>,
}

/// Request to verify a license against a domain.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub license_key: String,
    pub domain: String,
    #[serde(default)]
    pub server_hash: Option<String>,
}

/// Response from verification.
///
/// Business failures are reported with `valid: false` and a reason; the
/// HTTP status stays 200 for those.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl VerifyResponse {
    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(reason.into()),
            package_type: None,
            expires_at: None,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Activate a license on a domain.
///
/// # Behavior
/// - Not found, deactivated, or expired keys are rejected
/// - If unbound, binds to the requesting domain and stamps `activated_at`
/// - If already bound to the same domain, re-succeeds without side effects
/// - If bound to a different domain, counts a piracy attempt, writes a
///   piracy log entry, fires an out-of-band alert, and rejects
pub async fn activate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>, ClientError> {
    validate_request(&req.license_key, &req.domain)?;

    let key = canonicalize_key(&req.license_key);
    let client_ip = client_ip(&headers);
    let user_agent = user_agent(&headers);

    info!("Activation request for license_key={key} domain={}", req.domain);

    // Lookup failures are not logged: the license identity is unknown.
    let license = state
        .db
        .get_license_by_key(&key)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            warn!("License not found: {key}");
            ClientError::new(ClientErrorCode::LicenseNotFound, "License key not found")
        })?;

    if !license.is_active {
        log_rejection(&state.db, &license, &req, &client_ip, &user_agent, "Key deactivated").await;
        return Err(ClientError::new(
            ClientErrorCode::LicenseInactive,
            "License key is no longer active",
        ));
    }

    if license.is_expired() {
        log_rejection(&state.db, &license, &req, &client_ip, &user_agent, "Key expired").await;
        return Err(ClientError::new(
            ClientErrorCode::LicenseExpired,
            "License key has expired",
        ));
    }

    if license.is_bound_elsewhere(&req.domain) {
        return Err(record_piracy(&state, &license, &req, &client_ip, &user_agent).await);
    }

    // Bind (or re-bind to the same domain). The condition is re-checked
    // inside the store's UPDATE, so a concurrent activation from another
    // domain cannot also win.
    let bound = state
        .db
        .bind_license(&license.id, &req.domain, req.server_hash.as_deref())
        .await
        .map_err(internal_error)?;

    let updated = state
        .db
        .get_license_by_key(&key)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| {
            warn!("License {key} disappeared during activation");
            ClientError::new(ClientErrorCode::InternalError, "Internal server error")
        })?;

    if !bound {
        // Lost the bind race. If another domain won, this is a piracy event
        // after all; if the same domain won concurrently, fall through as an
        // idempotent success.
        if updated.is_bound_elsewhere(&req.domain) {
            return Err(record_piracy(&state, &updated, &req, &client_ip, &user_agent).await);
        }
    }

    let entry = NewLogEntry {
        license_id: updated.id.clone(),
        action: LogAction::Activate,
        domain: Some(req.domain.clone()),
        server_hash: req.server_hash.clone(),
        ip: Some(client_ip.clone()),
        user_agent: Some(user_agent.clone()),
        details: format!(
            "Activation OK. Holder: {} ({})",
            updated.holder_name,
            updated.office_name.as_deref().unwrap_or("-")
        ),
        is_piracy: false,
    };
    if let Err(e) = state.db.append_log(entry).await {
        warn!("Audit log write failed for activation of {key}: {e}");
    }

    info!("License {key} bound to domain {}", req.domain);

    Ok(Json(ActivateResponse {
        success: true,
        license: LicenseSummary {
            key: updated.key,
            package_type: updated.package_type,
            holder_name: updated.holder_name,
            office_name: updated.office_name,
            domain: req.domain,
            expires_at: updated.expires_at.map(rfc3339),
            activated_at: updated.activated_at.map(rfc3339),
        },
    }))
}

/// Verify a license against a domain.
///
/// # Behavior
/// - Not found, deactivated, or expired keys are invalid (HTTP 200)
/// - A domain mismatch counts a piracy attempt and writes a piracy log
///   entry, but does NOT alert — alerting is reserved for activation
/// - A matching (or never-bound) license is valid; `last_verified` is
///   touched, but verification never binds
pub async fn verify_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ClientError> {
    validate_request(&req.license_key, &req.domain)?;

    let key = canonicalize_key(&req.license_key);

    let Some(license) = state
        .db
        .get_license_by_key(&key)
        .await
        .map_err(internal_error)?
    else {
        return Ok(Json(VerifyResponse::invalid("License not found")));
    };

    if !license.is_active {
        return Ok(Json(VerifyResponse::invalid("License is not active")));
    }

    if license.is_expired() {
        return Ok(Json(VerifyResponse::invalid("License has expired")));
    }

    if license.is_bound_elsewhere(&req.domain) {
        let bound_domain = license.bound_domain.clone().unwrap_or_default();
        let attempt_count = state
            .db
            .record_piracy_attempt(&license.id)
            .await
            .map_err(internal_error)?;

        let entry = NewLogEntry {
            license_id: license.id.clone(),
            action: LogAction::PiracyAttempt,
            domain: Some(req.domain.clone()),
            server_hash: req.server_hash.clone(),
            ip: Some(client_ip(&headers)),
            user_agent: Some(user_agent(&headers)),
            details: format!(
                "Verify domain mismatch. Bound: {bound_domain}, Tried: {}",
                req.domain
            ),
            is_piracy: true,
        };
        if let Err(e) = state.db.append_log(entry).await {
            warn!("Audit log write failed for verify mismatch on {key}: {e}");
        }

        warn!(
            "Verify domain mismatch for {key}: bound={bound_domain} tried={} attempt={attempt_count}",
            req.domain
        );

        return Ok(Json(VerifyResponse::invalid("Domain mismatch")));
    }

    // Bound to this domain, or never bound. Verification never binds.
    if let Err(e) = state.db.touch_last_verified(&license.id).await {
        warn!("Failed to update last_verified for {key}: {e}");
    }

    Ok(Json(VerifyResponse {
        valid: true,
        error: None,
        package_type: Some(license.package_type),
        expires_at: license.expires_at.map(rfc3339),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Check the required request fields shared by activate and verify.
fn validate_request(license_key: &str, domain: &str) -> Result<(), ClientError> {
    validate_not_empty(license_key, "licenseKey")
        .and_then(|_| validate_not_empty(domain, "domain"))
        .and_then(|_| validate_length(domain, 1, 253, "domain"))
        .and_then(|_| validate_domain(domain, "domain"))
        .map_err(|e| ClientError::new(ClientErrorCode::InvalidRequest, e.to_string()))
}

/// Count and report a piracy event on the activation path: atomic counter
/// increment, piracy log entry, fire-and-forget alert, conflict response.
async fn record_piracy(
    state: &AppState,
    license: &License,
    req: &ActivateRequest,
    client_ip: &str,
    user_agent: &str,
) -> ClientError {
    let bound_domain = license.bound_domain.clone().unwrap_or_default();

    let attempt_count = match state.db.record_piracy_attempt(&license.id).await {
        Ok(count) => count,
        Err(e) => return internal_error(e),
    };

    let entry = NewLogEntry {
        license_id: license.id.clone(),
        action: LogAction::PiracyAttempt,
        domain: Some(req.domain.clone()),
        server_hash: req.server_hash.clone(),
        ip: Some(client_ip.to_string()),
        user_agent: Some(user_agent.to_string()),
        details: format!(
            "Piracy attempt: key of \"{}\" ({}) is bound to {bound_domain}, \
             attempted from {}. IP: {client_ip}. Attempt #{attempt_count}.",
            license.holder_name,
            license.office_name.as_deref().unwrap_or("-"),
            req.domain
        ),
        is_piracy: true,
    };
    if let Err(e) = state.db.append_log(entry).await {
        warn!("Audit log write failed for piracy attempt on {}: {e}", license.key);
    }

    warn!(
        "Piracy attempt on {}: bound={bound_domain} attempted={} attempt={attempt_count}",
        license.key, req.domain
    );

    let alert = PiracyAlert {
        license_key: mask_license_key(&license.key),
        holder_name: license.holder_name.clone(),
        office_name: license.office_name.clone(),
        bound_domain,
        attempted_domain: req.domain.clone(),
        attempted_ip: client_ip.to_string(),
        user_agent: user_agent.to_string(),
        attempt_count,
        timestamp: Utc::now().to_rfc3339(),
    };

    // Alert delivery must never block or fail the response.
    let notifier = Arc::clone(&state.notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&alert).await {
            warn!("Failed to deliver piracy alert: {e}");
        }
    });

    ClientError::new(
        ClientErrorCode::DomainConflict,
        "License key is already bound to another domain. This attempt has been logged.",
    )
}

/// Write a `reject` audit entry for a deactivated/expired activation attempt.
///
/// Log failures are swallowed: the rejection response does not depend on the
/// audit trail.
async fn log_rejection(
    db: &Database,
    license: &License,
    req: &ActivateRequest,
    client_ip: &str,
    user_agent: &str,
    reason: &str,
) {
    let entry = NewLogEntry {
        license_id: license.id.clone(),
        action: LogAction::Reject,
        domain: Some(req.domain.clone()),
        server_hash: req.server_hash.clone(),
        ip: Some(client_ip.to_string()),
        user_agent: Some(user_agent.to_string()),
        details: reason.to_string(),
        is_piracy: false,
    };
    if let Err(e) = db.append_log(entry).await {
        warn!("Audit log write failed for rejection of {}: {e}", license.key);
    }
}

/// Map an infrastructure failure to a generic client response, keeping the
/// real cause in the server log only.
fn internal_error(e: LicenseError) -> ClientError {
    warn!("Internal error while handling license request: {e}");
    ClientError::new(ClientErrorCode::InternalError, "Internal server error")
}

/// Requesting client IP, as supplied by the reverse proxy.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn rfc3339(dt: NaiveDateTime) -> String {
    dt.and_utc().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serialization() {
        let err = ClientError::new(ClientErrorCode::LicenseNotFound, "Not found");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("LICENSE_NOT_FOUND"));
        assert!(json.contains(r#""success":false"#));
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ClientError::new(ClientErrorCode::LicenseNotFound, "").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ClientError::new(ClientErrorCode::DomainConflict, "").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ClientError::new(ClientErrorCode::LicenseInactive, "").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ClientError::new(ClientErrorCode::InvalidRequest, "").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.7");

        headers.remove("x-forwarded-for");
        assert_eq!(client_ip(&headers), "198.51.100.1");

        headers.remove("x-real-ip");
        assert_eq!(client_ip(&headers), "unknown");
    }

    #[test]
    fn user_agent_falls_back_to_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(user_agent(&headers), "unknown");
    }

    #[test]
    fn activate_request_accepts_camel_case() {
        let req: ActivateRequest = serde_json::from_str(
            r#"{"licenseKey": "ntrs-ab12", "domain": "a.com", "serverHash": "deadbeef"}"#,
        )
        .unwrap();
        assert_eq!(req.license_key, "ntrs-ab12");
        assert_eq!(req.server_hash.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn verify_response_omits_absent_fields() {
        let resp = VerifyResponse::invalid("License not found");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""valid":false"#));
        assert!(!json.contains("packageType"));
        assert!(!json.contains("expiresAt"));
    }
}
