//! View endpoint integration tests
//!
//! Clicks are recorded through the redirect route, then read back through
//! `/view` and `/view/map` with a PIN.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use refcollector::config::{
    AccessConfig, Config, DatabaseBackend, DatabaseConfig, DeterrentConfig, GeoConfig,
    GuardConfig, IngestConfig, ServerConfig,
};
use refcollector::geo::{GeoError, GeoProvider};
use refcollector::models::GeoLocation;
use refcollector::server::create_app;
use refcollector::storage::{EventStore, SqliteStorage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::{Layer, ServiceExt};

fn create_test_config() -> Config {
    Config {
        database: DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        access: AccessConfig {
            default_pin: "1234".to_string(),
            salt: "s".to_string(),
        },
        ingest: IngestConfig {
            default_destination: "https://example.com".to_string(),
            max_name_len: IngestConfig::DEFAULT_MAX_NAME_LEN,
            deterrents: DeterrentConfig::default(),
        },
        geo: GeoConfig::default(),
        guard: GuardConfig::default(),
    }
}

#[derive(Default)]
struct StubProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl GeoProvider for StubProvider {
    async fn lookup(&self, _address: &str) -> Result<GeoLocation, GeoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeoLocation {
            continent: Some("North America".to_string()),
            country: Some("United States".to_string()),
            region: Some("New York".to_string()),
            city: Some("New York".to_string()),
            postal_code: Some("10001".to_string()),
            latitude: 40.75,
            longitude: -73.99,
        })
    }
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));
        self.inner.call(req)
    }
}

async fn setup() -> (Router, Arc<StubProvider>) {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let store: Arc<dyn EventStore> = Arc::new(storage);
    let provider = Arc::new(StubProvider::default());

    let app = create_app(&create_test_config(), store, provider.clone())
        .unwrap()
        .layer(TestConnectInfoLayer);
    (app, provider)
}

async fn send_click(app: &Router, query: &str, address: &str, user_agent: &str) {
    let request = Request::builder()
        .uri(format!("/?{query}"))
        .header("x-forwarded-for", address)
        .header(header::USER_AGENT, user_agent)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

async fn get(app: &Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn json_events(app: &Router, uri: &str) -> Vec<serde_json::Value> {
    let response = get(app, uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_view_requires_pin() {
    let (app, _) = setup().await;

    for uri in ["/view", "/view?pin=", "/view/map"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("pin"));
    }
}

#[tokio::test]
async fn test_click_then_view_with_pin() {
    let (app, provider) = setup().await;

    send_click(&app, "ref=promo&dst=https://example.com/p", "9.9.9.9", "Mozilla/5.0").await;

    let events = json_events(&app, "/view?pin=1234").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["name"], "promo");
    assert_eq!(events[0]["destination"], "https://example.com/p");
    assert_eq!(events[0]["request_address"], "9.9.9.9");
    assert_eq!(events[0]["city"], "New York");
    assert!(events[0]["time_human"].is_string());
    assert!(events[0].get("access_scope").is_none());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    send_click(&app, "ref=promo", "9.9.9.9", "Mozilla/5.0").await;
    assert_eq!(
        provider.calls.load(Ordering::SeqCst),
        1,
        "a known address is not looked up again"
    );
    assert_eq!(json_events(&app, "/view?pin=1234").await.len(), 2);

    assert!(json_events(&app, "/view?pin=9999").await.is_empty());
}

#[tokio::test]
async fn test_csv_lists_same_events_as_json() {
    let (app, _) = setup().await;
    send_click(&app, "ref=promo", "1.1.1.1", "Mozilla/5.0 (X11, Linux)").await;
    send_click(&app, "ref=news", "2.2.2.2", "Mozilla/5.0").await;

    let json = json_events(&app, "/view?pin=1234&fmt=json").await;

    let response = get(&app, "/view?pin=1234&fmt=csv").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "text/csv; charset=utf-8");
    let csv = body_bytes(response).await;

    let mut reader = csv::Reader::from_reader(csv.as_slice());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "id");
    assert_eq!(&headers[9], "user_agent");

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), json.len());
    for (row, record) in rows.iter().zip(&json) {
        assert_eq!(&row[0], record["id"].as_str().unwrap());
        assert_eq!(&row[2], record["name"].as_str().unwrap());
    }
    assert_eq!(&rows[0][9], "Mozilla/5.0 (X11; Linux)");
}

#[tokio::test]
async fn test_filters_and_range() {
    let (app, _) = setup().await;
    send_click(&app, "ref=promo", "1.1.1.1", "Mozilla/5.0").await;
    send_click(&app, "ref=news", "1.1.1.1", "Mozilla/5.0").await;
    send_click(&app, "ref=promo", "2.2.2.2", "Mozilla/5.0").await;

    assert_eq!(json_events(&app, "/view?pin=1234&name=promo").await.len(), 2);
    assert_eq!(json_events(&app, "/view?pin=1234&ip=1.1.1.1").await.len(), 2);
    assert_eq!(
        json_events(&app, "/view?pin=1234&name=promo&ip=2.2.2.2").await.len(),
        1
    );
    assert_eq!(json_events(&app, "/view?pin=1234&range=all").await.len(), 3);
}

#[tokio::test]
async fn test_unknown_format_falls_back_to_json() {
    let (app, _) = setup().await;
    send_click(&app, "ref=promo", "1.1.1.1", "Mozilla/5.0").await;

    let response = get(&app, "/view?pin=1234&fmt=xml").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/json");
}

#[tokio::test]
async fn test_map_page() {
    let (app, _) = setup().await;
    send_click(&app, "ref=promo", "1.1.1.1", "Mozilla/5.0").await;

    for uri in ["/view/map?pin=1234", "/view?pin=1234&fmt=map"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type(&response), "text/html; charset=utf-8");

        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("L.map"));
        assert!(html.contains("\"lat\":40.75"));
        assert!(html.contains("\"name\":\"promo\""));
    }
}
