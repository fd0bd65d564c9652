use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use domainlock::errors::{LicenseError, LicenseResult};
use domainlock::server::database::{Database, License, LogAction, NewLicense, NewLogEntry};

/// Helper: create an in-memory SQLite Database with both tables.
///
/// A single connection is required: every pool connection to
/// `sqlite::memory:` would otherwise get its own empty database.
async fn setup_in_memory_db() -> LicenseResult<Arc<Database>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| LicenseError::DatabaseError(format!("db connect failed: {e}")))?;

    let db = Arc::new(Database::SQLite(pool));
    db.migrate().await?;
    Ok(db)
}

fn sample_license(key: &str) -> NewLicense {
    NewLicense {
        key: key.to_string(),
        package_type: "complete".to_string(),
        holder_name: "Jane Holder".to_string(),
        office_name: Some("Holder & Partners".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_and_fetch_by_key() {
    let db = setup_in_memory_db().await.unwrap();

    let created = db
        .create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();
    assert!(created.is_active);
    assert_eq!(created.piracy_attempts, 0);
    assert!(created.bound_domain.is_none());

    let fetched = db
        .get_license_by_key("NTRS-AB12-CD34-EF56-GH78")
        .await
        .unwrap()
        .expect("license should exist");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.holder_name, "Jane Holder");

    let by_id = db
        .get_license_by_id(&created.id)
        .await
        .unwrap()
        .expect("license should exist by id");
    assert_eq!(by_id.key, created.key);
}

#[tokio::test]
async fn duplicate_key_is_a_distinguishable_error() {
    let db = setup_in_memory_db().await.unwrap();

    db.create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();

    let result = db
        .create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await;
    assert!(matches!(result, Err(LicenseError::DuplicateKey)));

    // The original record is untouched
    let fetched = db
        .get_license_by_key("NTRS-AB12-CD34-EF56-GH78")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.holder_name, "Jane Holder");
}

#[tokio::test]
async fn key_exists_reflects_the_store() {
    let db = setup_in_memory_db().await.unwrap();

    assert!(!db.key_exists("NTRS-AB12-CD34-EF56-GH78").await.unwrap());
    db.create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();
    assert!(db.key_exists("NTRS-AB12-CD34-EF56-GH78").await.unwrap());
}

#[tokio::test]
async fn bind_wins_only_when_unbound_or_same_domain() {
    let db = setup_in_memory_db().await.unwrap();
    let license = db
        .create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();

    // First bind wins
    assert!(db
        .bind_license(&license.id, "a.com", Some("hash-a"))
        .await
        .unwrap());

    let bound = db.get_license_by_id(&license.id).await.unwrap().unwrap();
    assert_eq!(bound.bound_domain.as_deref(), Some("a.com"));
    assert_eq!(bound.server_hash.as_deref(), Some("hash-a"));
    assert!(bound.activated_at.is_some());
    assert!(bound.last_verified.is_some());

    // Re-bind from the same domain is allowed and keeps the original
    // activation timestamp
    let first_activated_at = bound.activated_at;
    assert!(db
        .bind_license(&license.id, "a.com", Some("hash-a2"))
        .await
        .unwrap());
    let rebound = db.get_license_by_id(&license.id).await.unwrap().unwrap();
    assert_eq!(rebound.activated_at, first_activated_at);
    assert_eq!(rebound.server_hash.as_deref(), Some("hash-a2"));

    // A different domain loses the compare-and-update
    assert!(!db.bind_license(&license.id, "b.com", None).await.unwrap());
    let unchanged = db.get_license_by_id(&license.id).await.unwrap().unwrap();
    assert_eq!(unchanged.bound_domain.as_deref(), Some("a.com"));
}

#[tokio::test]
async fn bind_fails_for_unknown_license() {
    let db = setup_in_memory_db().await.unwrap();
    assert!(!db.bind_license("missing-id", "a.com", None).await.unwrap());
}

#[tokio::test]
async fn piracy_attempts_increment_atomically_and_return_the_count() {
    let db = setup_in_memory_db().await.unwrap();
    let license = db
        .create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();

    assert_eq!(db.record_piracy_attempt(&license.id).await.unwrap(), 1);
    assert_eq!(db.record_piracy_attempt(&license.id).await.unwrap(), 2);

    let fetched = db.get_license_by_id(&license.id).await.unwrap().unwrap();
    assert_eq!(fetched.piracy_attempts, 2);
    assert!(fetched.last_piracy_at.is_some());
}

#[tokio::test]
async fn piracy_attempt_on_unknown_license_is_not_found() {
    let db = setup_in_memory_db().await.unwrap();
    let result = db.record_piracy_attempt("missing-id").await;
    assert!(matches!(result, Err(LicenseError::NotFound)));
}

#[tokio::test]
async fn unbind_clears_binding_but_keeps_the_piracy_counter() {
    let db = setup_in_memory_db().await.unwrap();
    let license = db
        .create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();

    db.bind_license(&license.id, "a.com", Some("hash-a"))
        .await
        .unwrap();
    db.record_piracy_attempt(&license.id).await.unwrap();

    assert!(db.unbind_license(&license.id).await.unwrap());

    let unbound = db.get_license_by_id(&license.id).await.unwrap().unwrap();
    assert!(unbound.bound_domain.is_none());
    assert!(unbound.server_hash.is_none());
    assert!(unbound.activated_at.is_none());
    // Forensic history survives the unbind
    assert_eq!(unbound.piracy_attempts, 1);
    assert!(unbound.last_piracy_at.is_some());
}

#[tokio::test]
async fn update_details_never_touches_binding_or_counters() {
    let db = setup_in_memory_db().await.unwrap();
    let license = db
        .create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();

    db.bind_license(&license.id, "a.com", None).await.unwrap();
    db.record_piracy_attempt(&license.id).await.unwrap();

    let mut patched = db.get_license_by_id(&license.id).await.unwrap().unwrap();
    patched.holder_name = "New Holder".to_string();
    patched.is_active = false;
    patched.notes = Some("transferred".to_string());
    // Even if the caller tampers with engine-owned fields in the struct,
    // the details update must not write them.
    patched.bound_domain = Some("evil.com".to_string());
    patched.piracy_attempts = 0;

    assert!(db.update_license_details(&patched).await.unwrap());

    let stored = db.get_license_by_id(&license.id).await.unwrap().unwrap();
    assert_eq!(stored.holder_name, "New Holder");
    assert!(!stored.is_active);
    assert_eq!(stored.notes.as_deref(), Some("transferred"));
    assert_eq!(stored.bound_domain.as_deref(), Some("a.com"));
    assert_eq!(stored.piracy_attempts, 1);
}

#[tokio::test]
async fn logs_are_append_only_and_queryable() {
    let db = setup_in_memory_db().await.unwrap();
    let license = db
        .create_license(sample_license("NTRS-AB12-CD34-EF56-GH78"))
        .await
        .unwrap();

    let base = NewLogEntry {
        license_id: license.id.clone(),
        action: LogAction::Activate,
        domain: Some("a.com".to_string()),
        server_hash: None,
        ip: Some("203.0.113.7".to_string()),
        user_agent: Some("test-agent".to_string()),
        details: "Activation OK".to_string(),
        is_piracy: false,
    };

    db.append_log(base.clone()).await.unwrap();
    db.append_log(NewLogEntry {
        action: LogAction::Reject,
        details: "Key expired".to_string(),
        ..base.clone()
    })
    .await
    .unwrap();
    db.append_log(NewLogEntry {
        action: LogAction::PiracyAttempt,
        domain: Some("b.com".to_string()),
        details: "Verify domain mismatch. Bound: a.com, Tried: b.com".to_string(),
        is_piracy: true,
        ..base.clone()
    })
    .await
    .unwrap();

    let logs = db.logs_for_license(&license.id, 10).await.unwrap();
    assert_eq!(logs.len(), 3);
    // Newest first
    assert_eq!(logs[0].action, "piracy_attempt");
    assert!(logs[0].is_piracy);

    let piracy = db.recent_piracy_logs(10).await.unwrap();
    assert_eq!(piracy.len(), 1);
    assert_eq!(piracy[0].domain.as_deref(), Some("b.com"));

    let limited = db.logs_for_license(&license.id, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn stats_aggregate_counts() {
    let db = setup_in_memory_db().await.unwrap();

    let a = db
        .create_license(sample_license("NTRS-AAAA-AAAA-AAAA-AAAA"))
        .await
        .unwrap();
    let mut b = db
        .create_license(NewLicense {
            package_type: "no_ai".to_string(),
            ..sample_license("NTRS-BBBB-BBBB-BBBB-BBBB")
        })
        .await
        .unwrap();
    db.create_license(sample_license("NTRS-CCCC-CCCC-CCCC-CCCC"))
        .await
        .unwrap();

    db.bind_license(&a.id, "a.com", None).await.unwrap();
    b.is_active = false;
    db.update_license_details(&b).await.unwrap();

    db.append_log(NewLogEntry {
        license_id: a.id.clone(),
        action: LogAction::PiracyAttempt,
        domain: Some("b.com".to_string()),
        server_hash: None,
        ip: None,
        user_agent: None,
        details: "mismatch".to_string(),
        is_piracy: true,
    })
    .await
    .unwrap();

    let stats = db.license_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 2);
    assert_eq!(stats.bound, 1);
    assert_eq!(stats.total_piracy_attempts, 1);

    let complete = stats
        .by_package
        .iter()
        .find(|p| p.package_type == "complete")
        .unwrap();
    assert_eq!(complete.count, 2);
    let no_ai = stats
        .by_package
        .iter()
        .find(|p| p.package_type == "no_ai")
        .unwrap();
    assert_eq!(no_ai.count, 1);
}

#[tokio::test]
async fn hotspots_order_by_attempt_count() {
    let db = setup_in_memory_db().await.unwrap();

    let a = db
        .create_license(sample_license("NTRS-AAAA-AAAA-AAAA-AAAA"))
        .await
        .unwrap();
    let b = db
        .create_license(sample_license("NTRS-BBBB-BBBB-BBBB-BBBB"))
        .await
        .unwrap();
    db.create_license(sample_license("NTRS-CCCC-CCCC-CCCC-CCCC"))
        .await
        .unwrap();

    db.record_piracy_attempt(&a.id).await.unwrap();
    db.record_piracy_attempt(&b.id).await.unwrap();
    db.record_piracy_attempt(&b.id).await.unwrap();

    let hotspots = db.piracy_hotspots(10).await.unwrap();
    assert_eq!(hotspots.len(), 2);
    assert_eq!(hotspots[0].id, b.id);
    assert_eq!(hotspots[0].piracy_attempts, 2);
    assert_eq!(hotspots[1].id, a.id);
}

#[tokio::test]
async fn list_licenses_pages_newest_first() {
    let db = setup_in_memory_db().await.unwrap();

    for key in [
        "NTRS-AAAA-AAAA-AAAA-AAAA",
        "NTRS-BBBB-BBBB-BBBB-BBBB",
        "NTRS-CCCC-CCCC-CCCC-CCCC",
    ] {
        db.create_license(sample_license(key)).await.unwrap();
    }

    assert_eq!(db.count_licenses().await.unwrap(), 3);

    let first_page = db.list_licenses(2, 0).await.unwrap();
    assert_eq!(first_page.len(), 2);
    let second_page = db.list_licenses(2, 2).await.unwrap();
    assert_eq!(second_page.len(), 1);
}

#[test]
fn expiry_predicate_is_strict_on_now() {
    let make = |expires_at| License {
        id: "id".to_string(),
        key: "NTRS-AB12-CD34-EF56-GH78".to_string(),
        package_type: "complete".to_string(),
        holder_name: "Jane Holder".to_string(),
        office_name: None,
        holder_email: None,
        holder_phone: None,
        address: None,
        notes: None,
        is_active: true,
        bound_domain: None,
        server_hash: None,
        activated_at: None,
        expires_at,
        last_verified: None,
        piracy_attempts: 0,
        last_piracy_at: None,
        created_at: Utc::now().naive_utc(),
    };

    assert!(!make(None).is_expired());
    assert!(!make(Some(Utc::now().naive_utc() + Duration::hours(1))).is_expired());
    assert!(make(Some(Utc::now().naive_utc() - Duration::hours(1))).is_expired());
}

#[test]
fn bound_elsewhere_is_strictly_a_domain_difference() {
    let mut license = License {
        id: "id".to_string(),
        key: "NTRS-AB12-CD34-EF56-GH78".to_string(),
        package_type: "complete".to_string(),
        holder_name: "Jane Holder".to_string(),
        office_name: None,
        holder_email: None,
        holder_phone: None,
        address: None,
        notes: None,
        is_active: true,
        bound_domain: None,
        server_hash: None,
        activated_at: None,
        expires_at: None,
        last_verified: None,
        piracy_attempts: 0,
        last_piracy_at: None,
        created_at: Utc::now().naive_utc(),
    };

    // Never bound: no domain is "elsewhere"
    assert!(!license.is_bound_elsewhere("a.com"));

    license.bound_domain = Some("a.com".to_string());
    assert!(!license.is_bound_elsewhere("a.com"));
    assert!(license.is_bound_elsewhere("b.com"));
}
