//! Integration tests for the event store backends
//!
//! Tests can be filtered by database backend using the DATABASE_BACKEND environment variable:
//! - `DATABASE_BACKEND=sqlite cargo test` - Run only SQLite tests
//! - `DATABASE_BACKEND=postgres cargo test` - Run only PostgreSQL tests
//! - By default, both backends are tested; PostgreSQL needs DATABASE_URL

use refcollector::access::{AccessScope, ScopeKey};
use refcollector::models::{EventQuery, GeoLocation, NewEvent};
use refcollector::storage::{EventStore, PostgresStorage, SqliteStorage, StorageError};
use std::sync::Arc;
use uuid::Uuid;

/// Get the database backend to test from environment variable
fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true, // Test all backends if not specified
    }
}

/// Helper to create SQLite test storage
async fn create_sqlite_storage() -> Arc<dyn EventStore> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Helper to create PostgreSQL test storage
async fn create_postgres_storage() -> Option<Arc<dyn EventStore>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    let storage = PostgresStorage::new(&db_url, 5).await.ok()?;
    storage.init().await.ok()?;
    Some(Arc::new(storage))
}

fn scope(pin: &str) -> AccessScope {
    ScopeKey::new("s").derive(pin).unwrap()
}

/// Addresses are unique per test run so a shared PostgreSQL database stays usable.
fn unique_address() -> String {
    format!("test-{}", Uuid::new_v4())
}

fn lisbon() -> GeoLocation {
    GeoLocation {
        continent: Some("Europe".to_string()),
        country: Some("Portugal".to_string()),
        region: None,
        city: Some("Lisbon".to_string()),
        postal_code: None,
        latitude: 38.72,
        longitude: -9.14,
    }
}

fn new_event(address: &str, name: &str, geolocation: Option<GeoLocation>, scope: AccessScope) -> NewEvent {
    NewEvent {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        destination: "https://example.com".to_string(),
        request_address: address.to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        geolocation,
        access_scope: scope,
    }
}

fn all_of(scope: AccessScope, address: &str) -> EventQuery {
    EventQuery {
        scope,
        from: i64::MIN,
        to: i64::MAX,
        name: None,
        address: Some(address.to_string()),
    }
}

async fn check_duplicate_id_conflicts(storage: Arc<dyn EventStore>) {
    let address = unique_address();
    let id = Uuid::new_v4().to_string();

    let mut handles = vec![];
    for _ in 0..10 {
        let storage = Arc::clone(&storage);
        let mut event = new_event(&address, "promo", Some(lisbon()), scope("1234"));
        event.id = id.clone();
        handles.push(tokio::spawn(async move { storage.insert(event).await }));
    }

    let mut success_count = 0;
    let mut conflict_count = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => success_count += 1,
            Err(StorageError::Conflict) => conflict_count += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(success_count, 1, "Exactly one insert should succeed");
    assert_eq!(conflict_count, 9, "All others should get conflict");
    assert_eq!(
        storage.count_by_address(&address, i64::MIN, i64::MAX).await.unwrap(),
        1
    );
}

async fn check_scoped_query(storage: Arc<dyn EventStore>) {
    let address = unique_address();
    let mine = storage
        .insert(new_event(&address, "promo", Some(lisbon()), scope("1234")))
        .await
        .unwrap();
    storage
        .insert(new_event(&address, "promo", None, scope("1234")))
        .await
        .unwrap();
    storage
        .insert(new_event(&address, "promo", Some(lisbon()), scope("5678")))
        .await
        .unwrap();
    let newsletter = storage
        .insert(new_event(&address, "news", Some(lisbon()), scope("1234")))
        .await
        .unwrap();

    let events = storage.query_by_scope(&all_of(scope("1234"), &address)).await.unwrap();
    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![mine.id.as_str(), newsletter.id.as_str()]);
    assert!(events.iter().all(|e| e.access_scope == scope("1234")));
    assert_eq!(events[0].geolocation, Some(lisbon()));

    let mut by_name = all_of(scope("1234"), &address);
    by_name.name = Some("news".to_string());
    let events = storage.query_by_scope(&by_name).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, newsletter.id);

    let mut window = all_of(scope("1234"), &address);
    window.from = mine.created_at;
    let events = storage.query_by_scope(&window).await.unwrap();
    assert!(events.iter().all(|e| e.id != mine.id), "lower bound is exclusive");
}

async fn check_count_window(storage: Arc<dyn EventStore>) {
    let address = unique_address();
    let event = storage
        .insert(new_event(&address, "promo", None, scope("1234")))
        .await
        .unwrap();

    let at = event.created_at;
    assert_eq!(storage.count_by_address(&address, at - 1, at).await.unwrap(), 1);
    assert_eq!(storage.count_by_address(&address, at, i64::MAX).await.unwrap(), 0);
    assert_eq!(
        storage.count_by_address(&unique_address(), i64::MIN, i64::MAX).await.unwrap(),
        0
    );
}

async fn check_latest_geolocation(storage: Arc<dyn EventStore>) {
    let address = unique_address();
    assert_eq!(storage.latest_geolocation(&address).await.unwrap(), None);

    storage
        .insert(new_event(&address, "promo", Some(lisbon()), scope("1234")))
        .await
        .unwrap();
    let mut porto = lisbon();
    porto.city = Some("Porto".to_string());
    porto.latitude = 41.15;
    porto.longitude = -8.61;
    storage
        .insert(new_event(&address, "promo", Some(porto.clone()), scope("1234")))
        .await
        .unwrap();
    storage
        .insert(new_event(&address, "promo", None, scope("1234")))
        .await
        .unwrap();

    assert_eq!(storage.latest_geolocation(&address).await.unwrap(), Some(porto));
}

#[tokio::test]
async fn test_duplicate_id_conflicts_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_duplicate_id_conflicts(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_scoped_query_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_scoped_query(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_count_window_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_count_window(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_latest_geolocation_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_latest_geolocation(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_postgres_backend() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        println!("SKIPPED: DATABASE_URL not set");
        return;
    };

    check_duplicate_id_conflicts(Arc::clone(&storage)).await;
    check_scoped_query(Arc::clone(&storage)).await;
    check_count_window(Arc::clone(&storage)).await;
    check_latest_geolocation(storage).await;
}
