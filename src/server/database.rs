use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::get_config;
use crate::errors::{LicenseError, LicenseResult};

/// Represents a license record stored in the database.
///
/// This mirrors the `licenses` table schema.
#[derive(Debug, Clone, FromRow)]
pub struct License {
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
    pub activated_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub last_verified: Option<NaiveDateTime>,
    pub piracy_attempts: i64,
    pub last_piracy_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl License {
    /// Whether the expiry date has passed.
    ///
    /// The comparison is strict: a license expiring at exactly "now" is still
    /// valid.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now().naive_utc() > expires_at,
            None => false,
        }
    }

    /// Whether the license has been activated on some domain.
    pub fn is_bound(&self) -> bool {
        self.bound_domain.is_some()
    }

    /// Whether the license is bound to a domain other than `domain`.
    ///
    /// This is the piracy predicate: strictly "bound domain differs from the
    /// requested domain", never "already bound at all".
    pub fn is_bound_elsewhere(&self, domain: &str) -> bool {
        matches!(self.bound_domain.as_deref(), Some(bound) if bound != domain)
    }
}

/// Fields supplied when creating a license.
///
/// `id`, `created_at`, and the engine-owned columns (binding, counters,
/// timestamps) are filled in by the store.
#[derive(Debug, Clone, Default)]
pub struct NewLicense {
    pub key: String,
    pub package_type: String,
    pub holder_name: String,
    pub office_name: Option<String>,
    pub holder_email: Option<String>,
    pub holder_phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub bound_domain: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
}

/// Action recorded in an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    /// Successful domain binding.
    Activate,
    /// Activation rejected (deactivated or expired key).
    Reject,
    /// Domain mismatch detected.
    PiracyAttempt,
    /// Administrative unbind.
    Unbind,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Activate => "activate",
            LogAction::Reject => "reject",
            LogAction::PiracyAttempt => "piracy_attempt",
            LogAction::Unbind => "unbind",
        }
    }
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An audit log entry, immutable once written.
#[derive(Debug, Clone, FromRow)]
pub struct LicenseLog {
    pub id: i64,
    pub license_id: String,
    pub action: String,
    pub domain: Option<String>,
    pub server_hash: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: String,
    pub is_piracy: bool,
    pub created_at: NaiveDateTime,
}

/// Fields for appending an audit log entry.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub license_id: String,
    pub action: LogAction,
    pub domain: Option<String>,
    pub server_hash: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: String,
    pub is_piracy: bool,
}

/// Aggregate counts for the admin dashboard.
#[derive(Debug, Clone)]
pub struct LicenseStats {
    pub total: i64,
    pub active: i64,
    pub bound: i64,
    pub total_piracy_attempts: i64,
    pub by_package: Vec<PackageCount>,
}

/// Per-package-type license count.
#[derive(Debug, Clone, FromRow)]
pub struct PackageCount {
    pub package_type: String,
    pub count: i64,
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

/// Map an sqlx error, translating unique-constraint violations on `key`
/// into the distinguishable `DuplicateKey` error.
fn map_insert_error(e: sqlx::Error) -> LicenseError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return LicenseError::DuplicateKey;
        }
    }
    error!("license insert failed: {e}");
    LicenseError::DatabaseError(format!("database error: {e}"))
}

fn map_db_error(context: &str, e: sqlx::Error) -> LicenseError {
    error!("{context} failed: {e}");
    LicenseError::DatabaseError(format!("database error: {e}"))
}

impl Database {
    /// Initialize the database connection based on configuration.
    ///
    /// Uses the global configuration from `config.toml` and environment
    /// variables. See `crate::config` for configuration options.
    pub async fn new() -> LicenseResult<Arc<Self>> {
        let config = get_config()?;
        let db_config = &config.database;

        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::DatabaseError(format!("failed to connect to PostgreSQL: {e}"))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Create the `licenses` and `license_logs` tables if they do not exist.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS licenses (
                        id              TEXT PRIMARY KEY,
                        key             TEXT NOT NULL UNIQUE,
                        package_type    TEXT NOT NULL,
                        holder_name     TEXT NOT NULL,
                        office_name     TEXT,
                        holder_email    TEXT,
                        holder_phone    TEXT,
                        address         TEXT,
                        notes           TEXT,
                        is_active       BOOLEAN NOT NULL DEFAULT 1,
                        bound_domain    TEXT,
                        server_hash     TEXT,
                        activated_at    TIMESTAMP,
                        expires_at      TIMESTAMP,
                        last_verified   TIMESTAMP,
                        piracy_attempts INTEGER NOT NULL DEFAULT 0,
                        last_piracy_at  TIMESTAMP,
                        created_at      TIMESTAMP NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| map_db_error("SQLite create licenses table", e))?;

                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS license_logs (
                        id              INTEGER PRIMARY KEY AUTOINCREMENT,
                        license_id      TEXT NOT NULL,
                        action          TEXT NOT NULL,
                        domain          TEXT,
                        server_hash     TEXT,
                        ip              TEXT,
                        user_agent      TEXT,
                        details         TEXT NOT NULL,
                        is_piracy       BOOLEAN NOT NULL DEFAULT 0,
                        created_at      TIMESTAMP NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| map_db_error("SQLite create license_logs table", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS licenses (
                        id              TEXT PRIMARY KEY,
                        key             TEXT NOT NULL UNIQUE,
                        package_type    TEXT NOT NULL,
                        holder_name     TEXT NOT NULL,
                        office_name     TEXT,
                        holder_email    TEXT,
                        holder_phone    TEXT,
                        address         TEXT,
                        notes           TEXT,
                        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
                        bound_domain    TEXT,
                        server_hash     TEXT,
                        activated_at    TIMESTAMP,
                        expires_at      TIMESTAMP,
                        last_verified   TIMESTAMP,
                        piracy_attempts BIGINT NOT NULL DEFAULT 0,
                        last_piracy_at  TIMESTAMP,
                        created_at      TIMESTAMP NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| map_db_error("Postgres create licenses table", e))?;

                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS license_logs (
                        id              BIGSERIAL PRIMARY KEY,
                        license_id      TEXT NOT NULL,
                        action          TEXT NOT NULL,
                        domain          TEXT,
                        server_hash     TEXT,
                        ip              TEXT,
                        user_agent      TEXT,
                        details         TEXT NOT NULL,
                        is_piracy       BOOLEAN NOT NULL DEFAULT FALSE,
                        created_at      TIMESTAMP NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await
                .map_err(|e| map_db_error("Postgres create license_logs table", e))?;
            }
        }

        Ok(())
    }

    /// Check database connectivity (used by the health endpoint).
    pub async fn ping(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar::<_, i64>("SELECT 1")
                .fetch_one(pool)
                .await
                .is_ok(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar::<_, i64>("SELECT CAST(1 AS BIGINT)")
                .fetch_one(pool)
                .await
                .is_ok(),
        }
    }

    /// Backend name for diagnostics.
    pub fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    // ========================================================================
    // License store
    // ========================================================================

    /// Insert a new license.
    ///
    /// The key must already be canonical (uppercase). Returns the stored
    /// record. Fails with `DuplicateKey` if a license with this key exists;
    /// the caller decides whether to regenerate or surface the conflict.
    pub async fn create_license(&self, new: NewLicense) -> LicenseResult<License> {
        let license = License {
            id: Uuid::new_v4().to_string(),
            key: new.key,
            package_type: new.package_type,
            holder_name: new.holder_name,
            office_name: new.office_name,
            holder_email: new.holder_email,
            holder_phone: new.holder_phone,
            address: new.address,
            notes: new.notes,
            is_active: true,
            bound_domain: new.bound_domain,
            server_hash: None,
            activated_at: None,
            expires_at: new.expires_at,
            last_verified: None,
            piracy_attempts: 0,
            last_piracy_at: None,
            created_at: Utc::now().naive_utc(),
        };

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        id, key, package_type, holder_name, office_name,
                        holder_email, holder_phone, address, notes, is_active,
                        bound_domain, server_hash, activated_at, expires_at,
                        last_verified, piracy_attempts, last_piracy_at, created_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&license.id)
                .bind(&license.key)
                .bind(&license.package_type)
                .bind(&license.holder_name)
                .bind(&license.office_name)
                .bind(&license.holder_email)
                .bind(&license.holder_phone)
                .bind(&license.address)
                .bind(&license.notes)
                .bind(license.is_active)
                .bind(&license.bound_domain)
                .bind(&license.server_hash)
                .bind(license.activated_at)
                .bind(license.expires_at)
                .bind(license.last_verified)
                .bind(license.piracy_attempts)
                .bind(license.last_piracy_at)
                .bind(license.created_at)
                .execute(pool)
                .await
                .map_err(map_insert_error)?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    INSERT INTO licenses (
                        id, key, package_type, holder_name, office_name,
                        holder_email, holder_phone, address, notes, is_active,
                        bound_domain, server_hash, activated_at, expires_at,
                        last_verified, piracy_attempts, last_piracy_at, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                            $11, $12, $13, $14, $15, $16, $17, $18)
                    "#,
                )
                .bind(&license.id)
                .bind(&license.key)
                .bind(&license.package_type)
                .bind(&license.holder_name)
                .bind(&license.office_name)
                .bind(&license.holder_email)
                .bind(&license.holder_phone)
                .bind(&license.address)
                .bind(&license.notes)
                .bind(license.is_active)
                .bind(&license.bound_domain)
                .bind(&license.server_hash)
                .bind(license.activated_at)
                .bind(license.expires_at)
                .bind(license.last_verified)
                .bind(license.piracy_attempts)
                .bind(license.last_piracy_at)
                .bind(license.created_at)
                .execute(pool)
                .await
                .map_err(map_insert_error)?;
            }
        }

        Ok(license)
    }

    /// Check whether a license key exists (used by key generation retry).
    pub async fn key_exists(&self, key: &str) -> LicenseResult<bool> {
        let count: i64 = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_scalar("SELECT COUNT(*) FROM licenses WHERE key = ?")
                    .bind(key)
                    .fetch_one(pool)
                    .await
                    .map_err(|e| map_db_error("SQLite key_exists", e))?
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_scalar("SELECT COUNT(*) FROM licenses WHERE key = $1")
                    .bind(key)
                    .fetch_one(pool)
                    .await
                    .map_err(|e| map_db_error("Postgres key_exists", e))?
            }
        };

        Ok(count > 0)
    }

    /// Fetch a license by its canonical key.
    ///
    /// The caller is responsible for canonicalizing (trim + uppercase) first.
    pub async fn get_license_by_key(&self, key: &str) -> LicenseResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE key = ?")
                    .bind(key)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| map_db_error("SQLite get_license_by_key", e))?;

                Ok(license)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE key = $1")
                    .bind(key)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| map_db_error("Postgres get_license_by_key", e))?;

                Ok(license)
            }
        }
    }

    /// Fetch a license by its id.
    pub async fn get_license_by_id(&self, id: &str) -> LicenseResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| map_db_error("SQLite get_license_by_id", e))?;

                Ok(license)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let license = query_as::<_, License>("SELECT * FROM licenses WHERE id = $1")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| map_db_error("Postgres get_license_by_id", e))?;

                Ok(license)
            }
        }
    }

    /// List licenses, newest first, with pagination.
    pub async fn list_licenses(&self, limit: i64, offset: i64) -> LicenseResult<Vec<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, License>(
                "SELECT * FROM licenses ORDER BY created_at DESC LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("SQLite list_licenses", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, License>(
                "SELECT * FROM licenses ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("Postgres list_licenses", e)),
        }
    }

    /// Total number of licenses (for pagination).
    pub async fn count_licenses(&self) -> LicenseResult<i64> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar("SELECT COUNT(*) FROM licenses")
                .fetch_one(pool)
                .await
                .map_err(|e| map_db_error("SQLite count_licenses", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar("SELECT COUNT(*) FROM licenses")
                .fetch_one(pool)
                .await
                .map_err(|e| map_db_error("Postgres count_licenses", e)),
        }
    }

    /// Bind a license to a domain if it is unbound or already bound to the
    /// same domain.
    ///
    /// This is the compare-and-update at the heart of the at-most-one-domain
    /// invariant: the binding condition is evaluated inside a single UPDATE
    /// statement, so two racing activations from different domains cannot
    /// both win. `activated_at` is only filled when absent, making
    /// re-activation from the bound domain idempotent.
    ///
    /// Returns `true` if the bind won (row updated), `false` if the license
    /// was concurrently bound to a different domain (or does not exist) —
    /// the caller must re-read and route through the mismatch path.
    pub async fn bind_license(
        &self,
        id: &str,
        domain: &str,
        server_hash: Option<&str>,
    ) -> LicenseResult<bool> {
        let now = Utc::now().naive_utc();

        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                r#"
                UPDATE licenses
                SET bound_domain = ?,
                    server_hash = ?,
                    activated_at = COALESCE(activated_at, ?),
                    last_verified = ?
                WHERE id = ?
                  AND (bound_domain IS NULL OR bound_domain = ?)
                "#,
            )
            .bind(domain)
            .bind(server_hash)
            .bind(now)
            .bind(now)
            .bind(id)
            .bind(domain)
            .execute(pool)
            .await
            .map_err(|e| map_db_error("SQLite bind_license", e))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                r#"
                UPDATE licenses
                SET bound_domain = $1,
                    server_hash = $2,
                    activated_at = COALESCE(activated_at, $3),
                    last_verified = $4
                WHERE id = $5
                  AND (bound_domain IS NULL OR bound_domain = $1)
                "#,
            )
            .bind(domain)
            .bind(server_hash)
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| map_db_error("Postgres bind_license", e))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Atomically increment the piracy counter and stamp `last_piracy_at`.
    ///
    /// The increment happens inside the UPDATE statement, so concurrent
    /// mismatched requests each count exactly once. Returns the new counter
    /// value.
    pub async fn record_piracy_attempt(&self, id: &str) -> LicenseResult<i64> {
        let now = Utc::now().naive_utc();

        let count: Option<i64> = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_scalar(
                r#"
                UPDATE licenses
                SET piracy_attempts = piracy_attempts + 1,
                    last_piracy_at = ?
                WHERE id = ?
                RETURNING piracy_attempts
                "#,
            )
            .bind(now)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| map_db_error("SQLite record_piracy_attempt", e))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_scalar(
                r#"
                UPDATE licenses
                SET piracy_attempts = piracy_attempts + 1,
                    last_piracy_at = $1
                WHERE id = $2
                RETURNING piracy_attempts
                "#,
            )
            .bind(now)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| map_db_error("Postgres record_piracy_attempt", e))?,
        };

        count.ok_or(LicenseError::NotFound)
    }

    /// Update the `last_verified` timestamp.
    pub async fn touch_last_verified(&self, id: &str) -> LicenseResult<bool> {
        let now = Utc::now().naive_utc();

        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("UPDATE licenses SET last_verified = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map_err(|e| map_db_error("SQLite touch_last_verified", e))?
                .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("UPDATE licenses SET last_verified = $1 WHERE id = $2")
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| map_db_error("Postgres touch_last_verified", e))?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }

    /// Write the administratively patchable columns of a license.
    ///
    /// Only descriptive metadata, the kill-switch, the package type, and the
    /// expiry are written. Binding state and piracy counters are never
    /// touched here — those belong to the engine.
    pub async fn update_license_details(&self, license: &License) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                r#"
                UPDATE licenses
                SET package_type = ?,
                    holder_name = ?,
                    office_name = ?,
                    holder_email = ?,
                    holder_phone = ?,
                    address = ?,
                    notes = ?,
                    is_active = ?,
                    expires_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&license.package_type)
            .bind(&license.holder_name)
            .bind(&license.office_name)
            .bind(&license.holder_email)
            .bind(&license.holder_phone)
            .bind(&license.address)
            .bind(&license.notes)
            .bind(license.is_active)
            .bind(license.expires_at)
            .bind(&license.id)
            .execute(pool)
            .await
            .map_err(|e| map_db_error("SQLite update_license_details", e))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                r#"
                UPDATE licenses
                SET package_type = $1,
                    holder_name = $2,
                    office_name = $3,
                    holder_email = $4,
                    holder_phone = $5,
                    address = $6,
                    notes = $7,
                    is_active = $8,
                    expires_at = $9
                WHERE id = $10
                "#,
            )
            .bind(&license.package_type)
            .bind(&license.holder_name)
            .bind(&license.office_name)
            .bind(&license.holder_email)
            .bind(&license.holder_phone)
            .bind(&license.address)
            .bind(&license.notes)
            .bind(license.is_active)
            .bind(license.expires_at)
            .bind(&license.id)
            .execute(pool)
            .await
            .map_err(|e| map_db_error("Postgres update_license_details", e))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    /// Clear the domain binding of a license.
    ///
    /// Clears `bound_domain`, `server_hash`, and `activated_at`. The piracy
    /// counter is deliberately left intact — it is forensic history, not
    /// binding state.
    pub async fn unbind_license(&self, id: &str) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                 SET bound_domain = NULL, server_hash = NULL, activated_at = NULL \
                 WHERE id = ?",
            )
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| map_db_error("SQLite unbind_license", e))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                 SET bound_domain = NULL, server_hash = NULL, activated_at = NULL \
                 WHERE id = $1",
            )
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| map_db_error("Postgres unbind_license", e))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    // ========================================================================
    // Audit log
    // ========================================================================

    /// Append an audit log entry. The log is append-only: no update or
    /// delete operations exist on `license_logs`.
    pub async fn append_log(&self, entry: NewLogEntry) -> LicenseResult<()> {
        let now = Utc::now().naive_utc();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    INSERT INTO license_logs (
                        license_id, action, domain, server_hash,
                        ip, user_agent, details, is_piracy, created_at
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&entry.license_id)
                .bind(entry.action.as_str())
                .bind(&entry.domain)
                .bind(&entry.server_hash)
                .bind(&entry.ip)
                .bind(&entry.user_agent)
                .bind(&entry.details)
                .bind(entry.is_piracy)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| map_db_error("SQLite append_log", e))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    INSERT INTO license_logs (
                        license_id, action, domain, server_hash,
                        ip, user_agent, details, is_piracy, created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(&entry.license_id)
                .bind(entry.action.as_str())
                .bind(&entry.domain)
                .bind(&entry.server_hash)
                .bind(&entry.ip)
                .bind(&entry.user_agent)
                .bind(&entry.details)
                .bind(entry.is_piracy)
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| map_db_error("Postgres append_log", e))?;
            }
        }

        Ok(())
    }

    /// Fetch log entries for a license, newest first.
    pub async fn logs_for_license(
        &self,
        license_id: &str,
        limit: i64,
    ) -> LicenseResult<Vec<LicenseLog>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseLog>(
                "SELECT * FROM license_logs \
                 WHERE license_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(license_id)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("SQLite logs_for_license", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseLog>(
                "SELECT * FROM license_logs \
                 WHERE license_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
            )
            .bind(license_id)
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("Postgres logs_for_license", e)),
        }
    }

    /// Fetch the most recent piracy log entries across all licenses.
    pub async fn recent_piracy_logs(&self, limit: i64) -> LicenseResult<Vec<LicenseLog>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseLog>(
                "SELECT * FROM license_logs \
                 WHERE is_piracy = 1 ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("SQLite recent_piracy_logs", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseLog>(
                "SELECT * FROM license_logs \
                 WHERE is_piracy = TRUE ORDER BY created_at DESC, id DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("Postgres recent_piracy_logs", e)),
        }
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Aggregate counts for the admin dashboard.
    pub async fn license_stats(&self) -> LicenseResult<LicenseStats> {
        let (total, active, bound, total_piracy_attempts, by_package) = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let total: i64 = query_scalar("SELECT COUNT(*) FROM licenses")
                    .fetch_one(pool)
                    .await
                    .map_err(|e| map_db_error("SQLite stats total", e))?;
                let active: i64 =
                    query_scalar("SELECT COUNT(*) FROM licenses WHERE is_active = 1")
                        .fetch_one(pool)
                        .await
                        .map_err(|e| map_db_error("SQLite stats active", e))?;
                let bound: i64 =
                    query_scalar("SELECT COUNT(*) FROM licenses WHERE bound_domain IS NOT NULL")
                        .fetch_one(pool)
                        .await
                        .map_err(|e| map_db_error("SQLite stats bound", e))?;
                let piracy: i64 =
                    query_scalar("SELECT COUNT(*) FROM license_logs WHERE is_piracy = 1")
                        .fetch_one(pool)
                        .await
                        .map_err(|e| map_db_error("SQLite stats piracy", e))?;
                let by_package = query_as::<_, PackageCount>(
                    "SELECT package_type, COUNT(*) AS count FROM licenses GROUP BY package_type",
                )
                .fetch_all(pool)
                .await
                .map_err(|e| map_db_error("SQLite stats by_package", e))?;

                (total, active, bound, piracy, by_package)
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let total: i64 = query_scalar("SELECT COUNT(*) FROM licenses")
                    .fetch_one(pool)
                    .await
                    .map_err(|e| map_db_error("Postgres stats total", e))?;
                let active: i64 =
                    query_scalar("SELECT COUNT(*) FROM licenses WHERE is_active = TRUE")
                        .fetch_one(pool)
                        .await
                        .map_err(|e| map_db_error("Postgres stats active", e))?;
                let bound: i64 =
                    query_scalar("SELECT COUNT(*) FROM licenses WHERE bound_domain IS NOT NULL")
                        .fetch_one(pool)
                        .await
                        .map_err(|e| map_db_error("Postgres stats bound", e))?;
                let piracy: i64 =
                    query_scalar("SELECT COUNT(*) FROM license_logs WHERE is_piracy = TRUE")
                        .fetch_one(pool)
                        .await
                        .map_err(|e| map_db_error("Postgres stats piracy", e))?;
                let by_package = query_as::<_, PackageCount>(
                    "SELECT package_type, COUNT(*) AS count FROM licenses GROUP BY package_type",
                )
                .fetch_all(pool)
                .await
                .map_err(|e| map_db_error("Postgres stats by_package", e))?;

                (total, active, bound, piracy, by_package)
            }
        };

        Ok(LicenseStats {
            total,
            active,
            bound,
            total_piracy_attempts,
            by_package,
        })
    }

    /// Licenses with at least one recorded piracy attempt, worst first.
    pub async fn piracy_hotspots(&self, limit: i64) -> LicenseResult<Vec<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, License>(
                "SELECT * FROM licenses \
                 WHERE piracy_attempts > 0 ORDER BY piracy_attempts DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("SQLite piracy_hotspots", e)),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, License>(
                "SELECT * FROM licenses \
                 WHERE piracy_attempts > 0 ORDER BY piracy_attempts DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
            .map_err(|e| map_db_error("Postgres piracy_hotspots", e)),
        }
    }
}
