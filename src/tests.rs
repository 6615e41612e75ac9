//! Integration tests for the CarMart backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::access::RoleSet;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::integrations::{
    GatewayOrder, Geocoder, IntegrationError, Messenger, OrderRequest, PaymentGateway,
};
use crate::models::{CreateDealerRequest, CreateListingRequest, Dealer, Listing, Place};
use crate::search::SearchIndex;
use crate::{create_router, AppState};

const API_KEY: &str = "test-api-key";

struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<GatewayOrder, IntegrationError> {
        if order.amount > 10_000_000 {
            return Err(IntegrationError::Rejected(
                "Order amount exceeds maximum amount allowed.".into(),
            ));
        }
        Ok(GatewayOrder {
            id: "order_TEST123".into(),
            amount: order.amount,
            currency: order.currency.clone(),
            receipt: Some(order.receipt.clone()),
            status: "created".into(),
        })
    }
}

#[derive(Default)]
struct FakeGeocoder {
    calls: AtomicUsize,
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn reverse(&self, _lat: f64, _lng: f64) -> Result<Place, IntegrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Place {
            display_name: "Shivajinagar, Pune, Maharashtra, India".into(),
            city: Some("Pune".into()),
            state: Some("Maharashtra".into()),
            postcode: Some("411005".into()),
            country: Some("India".into()),
        })
    }
}

#[derive(Default)]
struct FakeMessenger {
    fail: bool,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_whatsapp(&self, phone: &str, _text: &str) -> Result<(), IntegrationError> {
        if self.fail {
            return Err(IntegrationError::Transport("provider unreachable".into()));
        }
        self.sent.lock().unwrap().push(phone.to_string());
        Ok(())
    }
}

struct Options {
    payments: bool,
    messenger_fails: bool,
    max_document_bytes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            payments: true,
            messenger_fails: false,
            max_document_bytes: 1024,
        }
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    pool: SqlitePool,
    geocoder: Arc<FakeGeocoder>,
    messenger: Arc<FakeMessenger>,
    temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_options(Options::default()).await
    }

    async fn with_options(options: Options) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");
        let document_dir = temp_dir.path().join("documents");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool.clone()));
        let search = Arc::new(SearchIndex::open(&index_path).expect("Failed to init search"));

        let config = Config {
            api_key: API_KEY.to_string(),
            db_path,
            index_path,
            document_dir,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            public_url: "https://cars.example.com".to_string(),
            razorpay: None,
            geocoder_url: "http://geocoder.invalid".to_string(),
            upload_link_ttl_hours: 72,
            session_ttl_hours: 1,
            max_document_bytes: options.max_document_bytes,
        };

        let geocoder = Arc::new(FakeGeocoder::default());
        let messenger = Arc::new(FakeMessenger {
            fail: options.messenger_fails,
            ..Default::default()
        });

        let state = AppState {
            repo: repo.clone(),
            search,
            cache: Arc::new(QueryCache::new()),
            config: Arc::new(config),
            payments: options
                .payments
                .then(|| Arc::new(FakeGateway) as Arc<dyn PaymentGateway>),
            geocoder: geocoder.clone(),
            messenger: messenger.clone(),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            repo,
            pool,
            geocoder,
            messenger,
            temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Call a function endpoint with the API key.
    async fn call(&self, name: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/functions/{}", name)))
            .header("apikey", API_KEY)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Grant roles and issue a session, returning the bearer token.
    async fn login(&self, user_id: &str, roles: &[&str]) -> String {
        self.repo
            .set_user_roles(user_id, RoleSet::from_tags(roles))
            .await
            .unwrap();

        let resp = self
            .client
            .post(self.url("/api/sessions"))
            .header("x-api-key", API_KEY)
            .json(&json!({"userId": user_id}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn get_as(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn send_as(
        &self,
        method: reqwest::Method,
        token: &str,
        path: &str,
        body: Value,
    ) -> reqwest::Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn seed_dealer(&self, owner: Option<&str>, whatsapp_opt_in: bool) -> Dealer {
        self.repo
            .create_dealer(&CreateDealerRequest {
                name: "Pune Motors".into(),
                phone: Some("+919800001234".into()),
                whatsapp_opt_in,
                city: Some("Pune".into()),
                owner_user_id: owner.map(str::to_string),
            })
            .await
            .unwrap()
    }

    async fn seed_listing(&self, dealer: &Dealer) -> Listing {
        self.repo
            .create_listing(&CreateListingRequest {
                dealer_id: dealer.id.clone(),
                title: "2019 Honda City VX".into(),
                make: "Honda".into(),
                model: "City".into(),
                year: 2019,
                price: 850_000,
                km_driven: 42_000,
                fuel_type: Some("petrol".into()),
                city: Some("Pune".into()),
                description: None,
            })
            .await
            .unwrap()
    }

    async fn seed_loan(&self, listing: &Listing) -> String {
        let resp = self
            .call(
                "create-loan-application",
                json!({
                    "listingId": listing.id,
                    "applicantName": "Asha Patil",
                    "phone": "+919811112222",
                    "loanAmount": 500000,
                    "tenureMonths": 48,
                    "applicantUserId": "user-asha"
                }),
            )
            .await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["application"]["id"].as_str().unwrap().to_string()
    }
}

async fn check_access(fixture: &TestFixture, token: &str, body: Value) -> Value {
    let resp = fixture
        .send_as(reqwest::Method::POST, token, "/api/access/check", body)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["data"].clone()
}

async fn upload_pdf(fixture: &TestFixture, token: &str) -> reqwest::Response {
    fixture
        .call(
            "upload-loan-document",
            json!({
                "token": token,
                "documentType": "salary_slip",
                "fileName": "slip.pdf",
                "contentType": "application/pdf",
                "contentBase64": STANDARD.encode(b"%PDF")
            }),
        )
        .await
}

async fn assert_error(resp: reqwest::Response, status: u16, code: &str) -> Value {
    assert_eq!(resp.status(), status);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], code);
    assert!(body["error"].is_string());
    body
}

// ==================== HEALTH & AUTH ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_functions_require_api_key() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/functions/track-interaction"))
        .json(&json!({"sessionId": "s1", "eventType": "page_view"}))
        .send()
        .await
        .unwrap();
    assert_error(resp, 401, "UNAUTHORIZED").await;

    let resp = fixture
        .client
        .post(fixture.url("/functions/track-interaction"))
        .header("x-api-key", "wrong-key")
        .json(&json!({"sessionId": "s1", "eventType": "page_view"}))
        .send()
        .await
        .unwrap();
    assert_error(resp, 401, "UNAUTHORIZED").await;

    let resp = fixture
        .client
        .post(fixture.url("/functions/track-interaction"))
        .bearer_auth(API_KEY)
        .json(&json!({"sessionId": "s1", "eventType": "page_view"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_function_preflight_allows_any_origin() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .request(reqwest::Method::OPTIONS, fixture.url("/functions/notify-dealer"))
        .header("Origin", "https://cars.example.com")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "apikey, content-type")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_session_lifecycle() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/session"))
        .send()
        .await
        .unwrap();
    assert_error(resp, 401, "UNAUTHORIZED").await;

    let resp = fixture.get_as("not-a-session", "/api/session").await;
    assert_error(resp, 401, "UNAUTHORIZED").await;

    let token = fixture.login("user-ravi", &["sales", "finance"]).await;
    let resp = fixture.get_as(&token, "/api/session").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["userId"], "user-ravi");
    assert_eq!(body["data"]["roles"], json!(["sales", "finance"]));

    let resp = fixture
        .send_as(reqwest::Method::DELETE, &token, "/api/session", json!({}))
        .await;
    assert_eq!(resp.status(), 200);

    let resp = fixture.get_as(&token, "/api/session").await;
    assert_error(resp, 401, "UNAUTHORIZED").await;
}

#[tokio::test]
async fn test_issuing_session_requires_api_key() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/sessions"))
        .json(&json!({"userId": "mallory"}))
        .send()
        .await
        .unwrap();
    assert_error(resp, 401, "UNAUTHORIZED").await;
}

#[tokio::test]
async fn test_issuing_session_without_user_id_is_enveloped() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/sessions"))
        .header("x-api-key", API_KEY)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    let body = assert_error(resp, 400, "VALIDATION_ERROR").await;
    assert_eq!(body["error"], "userId is required");
}

// ==================== ACCESS GATES ====================

#[tokio::test]
async fn test_access_check_scenarios() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.login("user-dealer", &["dealer"]).await;
    let sales = fixture.login("user-sales", &["sales"]).await;
    let admin = fixture.login("user-admin", &["powerdesk"]).await;

    let decision = check_access(
        &fixture,
        &dealer,
        json!({"roles": ["powerdesk", "dealer"], "onDeny": "fallback"}),
    )
    .await;
    assert_eq!(decision, json!({"granted": true, "outcome": "render"}));

    let decision = check_access(
        &fixture,
        &sales,
        json!({"roles": ["powerdesk", "dealer"], "onDeny": "fallback"}),
    )
    .await;
    assert_eq!(decision, json!({"granted": false, "outcome": "fallback"}));

    let decision = check_access(&fixture, &admin, json!({"module": "finance"})).await;
    assert_eq!(decision["granted"], true);

    let decision = check_access(
        &fixture,
        &dealer,
        json!({"roles": ["dealer", "finance"], "mode": "all", "onDeny": "notice"}),
    )
    .await;
    assert_eq!(decision["outcome"], "access_denied");

    let resp = fixture
        .send_as(
            reqwest::Method::POST,
            &dealer,
            "/api/access/check",
            json!({"roles": ["janitor"]}),
        )
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;
}

#[tokio::test]
async fn test_console_endpoints_are_role_gated() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.login("user-dealer", &["dealer"]).await;
    let sales = fixture.login("user-sales", &["sales"]).await;
    let admin = fixture.login("user-admin", &["powerdesk"]).await;

    let resp = fixture.get_as(&dealer, "/api/dealer/metrics").await;
    assert_eq!(resp.status(), 200);

    let resp = fixture.get_as(&sales, "/api/dealer/metrics").await;
    assert_error(resp, 403, "FORBIDDEN").await;

    let resp = fixture.get_as(&sales, "/api/powerdesk/loans").await;
    assert_error(resp, 403, "FORBIDDEN").await;

    for path in [
        "/api/powerdesk/loans",
        "/api/powerdesk/leads/top",
        "/api/powerdesk/funnel",
        "/api/dealer/metrics",
    ] {
        let resp = fixture.get_as(&admin, path).await;
        assert_eq!(resp.status(), 200, "{}", path);
    }
}

#[tokio::test]
async fn test_role_grant_takes_effect_immediately() {
    let fixture = TestFixture::new().await;
    let admin = fixture.login("user-admin", &["powerdesk"]).await;
    let analyst = fixture.login("user-analyst", &["support"]).await;

    // Cache the analyst's role set
    let resp = fixture.get_as(&analyst, "/api/powerdesk/funnel").await;
    assert_error(resp, 403, "FORBIDDEN").await;

    let resp = fixture
        .send_as(
            reqwest::Method::PUT,
            &admin,
            "/api/powerdesk/users/user-analyst/roles",
            json!({"roles": ["marketing"]}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["roles"], json!(["marketing"]));

    let resp = fixture.get_as(&analyst, "/api/powerdesk/funnel").await;
    assert_eq!(resp.status(), 200);

    // Only the super-admin manages users
    let resp = fixture
        .send_as(
            reqwest::Method::PUT,
            &analyst,
            "/api/powerdesk/users/user-analyst/roles",
            json!({"roles": ["powerdesk"]}),
        )
        .await;
    assert_error(resp, 403, "FORBIDDEN").await;
}

// ==================== LOANS ====================

#[tokio::test]
async fn test_loan_application_flow() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(Some("user-dealer"), true).await;
    let listing = fixture.seed_listing(&dealer).await;
    let finance = fixture.login("user-finance", &["finance"]).await;

    let resp = fixture
        .call(
            "create-loan-application",
            json!({
                "listingId": listing.id,
                "applicantName": "Asha Patil",
                "phone": "+919811112222",
                "loanAmount": 500000,
                "applicantUserId": "user-asha"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    let application = &body["data"]["application"];
    assert_eq!(application["status"], "submitted");
    assert_eq!(application["tenureMonths"], 60);
    assert_eq!(application["dealerId"], dealer.id.as_str());
    assert_eq!(body["data"]["notification"]["status"], "completed");
    assert_eq!(body["data"]["whatsapp"]["status"], "completed");
    let application_id = application["id"].as_str().unwrap().to_string();

    let alerts = fixture.repo.list_notifications(&dealer.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(
        fixture.messenger.sent.lock().unwrap().as_slice(),
        ["+919800001234"]
    );

    // Finance console sees it, and sees status changes without waiting out the cache
    let resp = fixture.get_as(&finance, "/api/powerdesk/loans").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["status"], "submitted");

    let resp = fixture
        .call(
            "update-loan-status",
            json!({"applicationId": application_id, "status": "approved"}),
        )
        .await;
    assert_error(resp, 409, "CONFLICT").await;

    let resp = fixture
        .call(
            "update-loan-status",
            json!({"applicationId": application_id, "status": "under_review", "note": "Docs pending"}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["application"]["status"], "under_review");
    assert_eq!(body["data"]["notification"]["status"], "completed");

    let resp = fixture.get_as(&finance, "/api/powerdesk/loans").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["status"], "under_review");

    let resp = fixture
        .get_as(&finance, "/api/powerdesk/loans?status=submitted")
        .await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([]));

    let applicant_alerts = fixture.repo.list_notifications("user-asha").await.unwrap();
    assert_eq!(applicant_alerts.len(), 1);
    assert!(applicant_alerts[0].body.contains("under review: Docs pending"));

    // The dealer's inbox carries the dealership's alerts
    let owner = fixture.login("user-dealer", &["dealer"]).await;
    let resp = fixture.get_as(&owner, "/api/notifications").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["kind"], "loan");
    assert_eq!(body["data"][0]["read"], false);
}

#[tokio::test]
async fn test_loan_application_validation() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;
    let listing = fixture.seed_listing(&dealer).await;

    let resp = fixture
        .call(
            "create-loan-application",
            json!({"listingId": listing.id, "applicantName": "Asha", "loanAmount": 100000}),
        )
        .await;
    let body = assert_error(resp, 400, "VALIDATION_ERROR").await;
    assert_eq!(body["error"], "phone is required");

    let resp = fixture
        .call(
            "create-loan-application",
            json!({
                "listingId": listing.id,
                "applicantName": "Asha",
                "phone": "+919811112222",
                "loanAmount": 100000,
                "tenureMonths": 120
            }),
        )
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let resp = fixture
        .call(
            "create-loan-application",
            json!({
                "listingId": "missing",
                "applicantName": "Asha",
                "phone": "+919811112222",
                "loanAmount": 100000
            }),
        )
        .await;
    assert_error(resp, 404, "NOT_FOUND").await;

    let loans = fixture.repo.list_loan_applications(None).await.unwrap();
    assert!(loans.is_empty());
}

#[tokio::test]
async fn test_malformed_function_bodies_get_error_envelope() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;
    let listing = fixture.seed_listing(&dealer).await;

    let resp = fixture
        .call(
            "create-loan-application",
            json!({
                "listingId": listing.id,
                "applicantName": "Asha",
                "phone": "+919811112222",
                "loanAmount": "lots"
            }),
        )
        .await;
    assert!(resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json")));
    let body = assert_error(resp, 400, "VALIDATION_ERROR").await;
    assert!(body["error"].as_str().unwrap().contains("loanAmount"));

    let resp = fixture
        .client
        .post(fixture.url("/functions/track-interaction"))
        .header("apikey", API_KEY)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_error(resp, 400, "BAD_REQUEST").await;

    let token = fixture.login("user-ops", &["powerdesk"]).await;
    let resp = fixture
        .get_as(&token, "/api/powerdesk/funnel?days=many")
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let loans = fixture.repo.list_loan_applications(None).await.unwrap();
    assert!(loans.is_empty());
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_loan() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;
    let listing = fixture.seed_listing(&dealer).await;

    sqlx::query("DROP TABLE notifications")
        .execute(&fixture.pool)
        .await
        .unwrap();

    let resp = fixture
        .call(
            "create-loan-application",
            json!({
                "listingId": listing.id,
                "applicantName": "Asha",
                "phone": "+919811112222",
                "loanAmount": 250000
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["notification"]["status"], "failed");
    assert_eq!(body["data"]["whatsapp"]["status"], "skipped");

    let loans = fixture.repo.list_loan_applications(None).await.unwrap();
    assert_eq!(loans.len(), 1);
}

#[tokio::test]
async fn test_document_upload_via_link() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;
    let listing = fixture.seed_listing(&dealer).await;
    let application_id = fixture.seed_loan(&listing).await;

    let resp = fixture
        .call(
            "generate-loan-upload-link",
            json!({"applicationId": application_id}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(
        body["data"]["url"],
        format!("https://cars.example.com/loan-documents/upload?token={}", token)
    );

    let resp = fixture
        .call(
            "upload-loan-document",
            json!({
                "token": token,
                "documentType": "salary_slip",
                "fileName": "../march slip.pdf",
                "contentType": "application/pdf",
                "contentBase64": STANDARD.encode(b"%PDF-1.4 test document")
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let stored_path = body["data"]["storagePath"].as_str().unwrap();
    assert!(stored_path.starts_with(fixture.temp_dir.path().to_str().unwrap()));
    assert!(stored_path.ends_with("-march_slip.pdf"));
    assert_eq!(
        std::fs::read(stored_path).unwrap(),
        b"%PDF-1.4 test document"
    );

    let documents = fixture
        .repo
        .list_loan_documents(&application_id)
        .await
        .unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].size_bytes, 22);

    let finance = fixture.login("user-finance", &["finance"]).await;
    let resp = fixture
        .get_as(
            &finance,
            &format!("/api/powerdesk/loans/{}/documents", application_id),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["documentType"], "salary_slip");
    assert_eq!(body["data"][0]["contentType"], "application/pdf");

    let resp = fixture
        .get_as(&finance, "/api/powerdesk/loans/missing/documents")
        .await;
    assert_error(resp, 404, "NOT_FOUND").await;

    let resp = fixture
        .call(
            "upload-loan-document",
            json!({
                "token": token,
                "documentType": "pan",
                "fileName": "pan.exe",
                "contentType": "application/x-msdownload",
                "contentBase64": STANDARD.encode(b"MZ")
            }),
        )
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let resp = fixture
        .call(
            "upload-loan-document",
            json!({
                "token": token,
                "documentType": "bank_statement",
                "fileName": "statement.png",
                "contentType": "image/png",
                "contentBase64": STANDARD.encode(vec![7u8; 2048])
            }),
        )
        .await;
    assert_error(resp, 413, "PAYLOAD_TOO_LARGE").await;
}

#[tokio::test]
async fn test_expired_upload_link_rejected() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;
    let listing = fixture.seed_listing(&dealer).await;
    let application_id = fixture.seed_loan(&listing).await;

    let expired = fixture
        .repo
        .create_upload_link(&application_id, Utc::now() - Duration::hours(1))
        .await
        .unwrap();

    assert_error(upload_pdf(&fixture, &expired.token).await, 401, "UNAUTHORIZED").await;
    assert_error(upload_pdf(&fixture, "unknown-token").await, 401, "UNAUTHORIZED").await;

    assert!(fixture
        .repo
        .list_loan_documents(&application_id)
        .await
        .unwrap()
        .is_empty());
}

// ==================== PAYMENTS ====================

#[tokio::test]
async fn test_razorpay_order_created_and_recorded() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;

    let resp = fixture
        .call(
            "create-razorpay-order",
            json!({"amount": 499.5, "dealerId": dealer.id, "plan": "premium"}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["orderId"], "order_TEST123");
    assert_eq!(body["data"]["amount"], 49950);
    assert_eq!(body["data"]["currency"], "INR");
    assert_eq!(body["data"]["keyId"], "rzp_test_key");
    assert!(body["data"]["receipt"].as_str().unwrap().starts_with("rcpt_"));

    let resp = fixture
        .call(
            "create-razorpay-order",
            json!({"amount": 200000, "dealerId": dealer.id, "plan": "enterprise"}),
        )
        .await;
    let body = assert_error(resp, 422, "REJECTED").await;
    assert_eq!(body["error"], "Order amount exceeds maximum amount allowed.");

    let resp = fixture
        .call(
            "create-razorpay-order",
            json!({"amount": 0, "dealerId": dealer.id, "plan": "premium"}),
        )
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let resp = fixture
        .call(
            "create-razorpay-order",
            json!({"amount": 1e15, "dealerId": dealer.id, "plan": "premium"}),
        )
        .await;
    let body = assert_error(resp, 400, "VALIDATION_ERROR").await;
    assert_eq!(body["error"], "amount must not exceed 10000000 rupees");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_orders")
        .fetch_one(&fixture.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_razorpay_unconfigured_fails_closed() {
    let fixture = TestFixture::with_options(Options {
        payments: false,
        ..Default::default()
    })
    .await;
    let dealer = fixture.seed_dealer(None, false).await;

    let resp = fixture
        .call(
            "create-razorpay-order",
            json!({"amount": 499, "dealerId": dealer.id, "plan": "premium"}),
        )
        .await;
    assert_error(resp, 503, "NOT_CONFIGURED").await;
}

// ==================== NOTIFY / GEOCODE / TRACKING ====================

#[tokio::test]
async fn test_whatsapp_failure_does_not_fail_notification() {
    let fixture = TestFixture::with_options(Options {
        messenger_fails: true,
        ..Default::default()
    })
    .await;
    let dealer = fixture.seed_dealer(None, true).await;

    let resp = fixture
        .call(
            "notify-dealer",
            json!({
                "dealerId": dealer.id,
                "message": "Is the City still available?",
                "customerName": "Ravi",
                "kind": "test_drive"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["whatsapp"]["status"], "failed");
    assert!(body["data"]["whatsapp"]["reason"]
        .as_str()
        .unwrap()
        .contains("provider unreachable"));

    let alerts = fixture.repo.list_notifications(&dealer.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, body["data"]["notificationId"].as_str().unwrap());
    assert!(alerts[0].body.contains("Customer: Ravi"));
}

#[tokio::test]
async fn test_notify_dealer_skips_whatsapp_without_opt_in() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;

    let resp = fixture
        .call(
            "notify-dealer",
            json!({"dealerId": dealer.id, "message": "New booking"}),
        )
        .await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["whatsapp"]["status"], "skipped");
    assert_eq!(
        body["data"]["whatsapp"]["reason"],
        "dealer has not opted in to WhatsApp"
    );
    assert!(fixture.messenger.sent.lock().unwrap().is_empty());

    let resp = fixture
        .call("notify-dealer", json!({"dealerId": dealer.id}))
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let resp = fixture
        .call(
            "notify-dealer",
            json!({"dealerId": "nobody", "message": "hello"}),
        )
        .await;
    assert_error(resp, 404, "NOT_FOUND").await;
}

#[tokio::test]
async fn test_reverse_geocode_cached_per_rounded_coordinate() {
    let fixture = TestFixture::new().await;

    for (lat, lng) in [(18.53041, 73.84742), (18.53044, 73.84738)] {
        let resp = fixture
            .call("reverse-geocode", json!({"lat": lat, "lng": lng}))
            .await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["city"], "Pune");
    }
    assert_eq!(fixture.geocoder.calls.load(Ordering::SeqCst), 1);

    let resp = fixture
        .call("reverse-geocode", json!({"lat": 91.0, "lng": 73.8}))
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;
    assert_eq!(fixture.geocoder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tracking_feeds_funnel() {
    let fixture = TestFixture::new().await;
    let analyst = fixture.login("user-analyst", &["marketing"]).await;

    let resp = fixture.get_as(&analyst, "/api/powerdesk/funnel?days=7").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["steps"][0]["count"], 0);

    let resp = fixture
        .call(
            "track-interaction",
            json!({"sessionId": "s1", "eventType": "listing_view", "entityType": "listing", "entityId": "l1"}),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let resp = fixture.get_as(&analyst, "/api/powerdesk/funnel?days=7").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["steps"][0]["event"], "listing_view");
    assert_eq!(body["data"]["steps"][0]["count"], 1);

    let resp = fixture
        .call(
            "track-interaction",
            json!({"sessionId": "s1", "eventType": "teleport"}),
        )
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let resp = fixture
        .call(
            "track-interaction",
            json!({"sessionId": "s1", "eventType": "search", "metadata": ["not", "an", "object"]}),
        )
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let resp = fixture
        .call("track-interaction", json!({"eventType": "search"}))
        .await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;

    let resp = fixture.get_as(&analyst, "/api/powerdesk/funnel?days=0").await;
    assert_error(resp, 400, "VALIDATION_ERROR").await;
}

// ==================== LISTINGS & LEADS ====================

#[tokio::test]
async fn test_dealer_lists_only_for_own_dealership() {
    let fixture = TestFixture::new().await;
    let own = fixture.seed_dealer(Some("user-dealer"), false).await;
    let other = fixture.seed_dealer(Some("someone-else"), false).await;
    let token = fixture.login("user-dealer", &["dealer"]).await;

    // Cache an empty browse result first
    let resp = fixture.get_as(&token, "/api/listings?city=Pune").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([]));

    let listing = json!({
        "title": "2017 Maruti Swift VXI",
        "make": "Maruti",
        "model": "Swift",
        "year": 2017,
        "price": 420000,
        "kmDriven": 61000,
        "city": "Pune"
    });

    let mut mine = listing.clone();
    mine["dealerId"] = json!(own.id);
    let resp = fixture
        .send_as(reqwest::Method::POST, &token, "/api/listings", mine)
        .await;
    assert_eq!(resp.status(), 200);

    let mut theirs = listing.clone();
    theirs["dealerId"] = json!(other.id);
    let resp = fixture
        .send_as(reqwest::Method::POST, &token, "/api/listings", theirs)
        .await;
    assert_error(resp, 403, "FORBIDDEN").await;

    let resp = fixture.get_as(&token, "/api/listings?city=Pune").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let resp = fixture.get_as(&token, "/api/listings?q=swift").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["title"], "2017 Maruti Swift VXI");

    let resp = fixture.get_as(&token, "/api/dealer/metrics").await;
    let body: Value = resp.json().await.unwrap();
    let metrics = body["data"].as_array().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["activeListings"], 1);
    assert_eq!(metrics[0]["inventoryValue"], 420000);
}

#[tokio::test]
async fn test_search_filters_apply_before_paging() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, false).await;
    let token = fixture.login("user-sales", &["sales"]).await;

    for (title, model, city) in [
        ("2018 Honda Amaze S", "Amaze", "Mumbai"),
        ("2020 Honda Jazz V", "Jazz", "Mumbai"),
        ("2019 Honda City VX", "City", "Pune"),
    ] {
        let resp = fixture
            .send_as(
                reqwest::Method::POST,
                &token,
                "/api/listings",
                json!({
                    "dealerId": dealer.id,
                    "title": title,
                    "make": "Honda",
                    "model": model,
                    "year": 2019,
                    "price": 700000,
                    "kmDriven": 30000,
                    "city": city
                }),
            )
            .await;
        assert_eq!(resp.status(), 200);
    }

    let resp = fixture
        .get_as(&token, "/api/listings?q=honda&city=Pune&limit=2")
        .await;
    let body: Value = resp.json().await.unwrap();
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["city"], "Pune");

    let resp = fixture
        .get_as(&token, "/api/listings?q=honda&city=mumbai&limit=1&offset=1")
        .await;
    let body: Value = resp.json().await.unwrap();
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["city"], "Mumbai");
}

#[tokio::test]
async fn test_enquiry_moves_through_lead_pipeline() {
    let fixture = TestFixture::new().await;
    let dealer = fixture.seed_dealer(None, true).await;
    let listing = fixture.seed_listing(&dealer).await;
    let customer = fixture.login("user-customer", &["customer"]).await;
    let sales = fixture.login("user-sales", &["sales"]).await;

    let resp = fixture.get_as(&sales, "/api/powerdesk/leads/top").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([]));

    let resp = fixture
        .send_as(
            reqwest::Method::POST,
            &customer,
            "/api/enquiries",
            json!({
                "listingId": listing.id,
                "customerName": "Meera",
                "customerPhone": "+919833334444",
                "message": "Is the price negotiable?"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["notification"]["status"], "completed");
    let enquiry_id = body["data"]["enquiry"]["id"].as_str().unwrap().to_string();

    let resp = fixture.get_as(&sales, "/api/powerdesk/leads/top").await;
    let body: Value = resp.json().await.unwrap();
    let lead = &body["data"][0];
    assert_eq!(lead["enquiryId"], enquiry_id.as_str());
    // new (40) + under a day old (30) + phone (10)
    assert_eq!(lead["score"], 80);
    assert_eq!(lead["temperature"], "hot");
    assert_eq!(lead["dealerName"], "Pune Motors");

    // Customers cannot work the pipeline
    let resp = fixture
        .send_as(
            reqwest::Method::PUT,
            &customer,
            &format!("/api/enquiries/{}/status", enquiry_id),
            json!({"status": "converted"}),
        )
        .await;
    assert_error(resp, 403, "FORBIDDEN").await;

    let resp = fixture
        .send_as(
            reqwest::Method::PUT,
            &sales,
            &format!("/api/enquiries/{}/status", enquiry_id),
            json!({"status": "converted"}),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let resp = fixture.get_as(&sales, "/api/powerdesk/leads/top").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_dealer_sees_only_own_leads() {
    let fixture = TestFixture::new().await;
    let dealer_a = fixture.seed_dealer(Some("user-dealer-a"), false).await;
    let dealer_b = fixture.seed_dealer(Some("user-dealer-b"), false).await;
    let listing_a = fixture.seed_listing(&dealer_a).await;
    let listing_b = fixture.seed_listing(&dealer_b).await;
    let customer = fixture.login("user-customer", &["customer"]).await;
    let owner_a = fixture.login("user-dealer-a", &["dealer"]).await;
    let owner_b = fixture.login("user-dealer-b", &["dealer"]).await;
    let unowned = fixture.login("user-dealer-c", &["dealer"]).await;
    let sales = fixture.login("user-sales", &["sales"]).await;

    for (listing, name) in [(&listing_a, "Meera"), (&listing_b, "Rahul")] {
        let resp = fixture
            .send_as(
                reqwest::Method::POST,
                &customer,
                "/api/enquiries",
                json!({
                    "listingId": listing.id,
                    "customerName": name,
                    "customerPhone": "+919833334444"
                }),
            )
            .await;
        assert_eq!(resp.status(), 200);
    }

    let lead_names = |body: Value| -> Vec<String> {
        let mut names: Vec<String> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|lead| lead["customerName"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        names
    };

    // Sales warms the shared cache with every dealer's leads first
    let resp = fixture.get_as(&sales, "/api/powerdesk/leads/top").await;
    assert_eq!(lead_names(resp.json().await.unwrap()), vec!["Meera", "Rahul"]);

    let resp = fixture.get_as(&owner_a, "/api/powerdesk/leads/top").await;
    let leads = lead_names(resp.json().await.unwrap());
    assert_eq!(leads, vec!["Meera"]);

    let resp = fixture.get_as(&owner_b, "/api/powerdesk/leads/top").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"][0]["dealerId"], dealer_b.id.as_str());
    assert_eq!(lead_names(body), vec!["Rahul"]);

    let resp = fixture.get_as(&unowned, "/api/powerdesk/leads/top").await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_onboarding_dealer_requires_sales_or_support() {
    let fixture = TestFixture::new().await;
    let support = fixture.login("user-support", &["support"]).await;
    let dealer = fixture.login("user-dealer", &["dealer"]).await;

    let body = json!({"name": "Nashik Wheels", "ownerUserId": "user-dealer", "whatsappOptIn": true});

    let resp = fixture
        .send_as(reqwest::Method::POST, &dealer, "/api/dealers", body.clone())
        .await;
    assert_error(resp, 403, "FORBIDDEN").await;

    let resp = fixture
        .send_as(reqwest::Method::POST, &support, "/api/dealers", body)
        .await;
    assert_eq!(resp.status(), 200);

    let owned = fixture
        .repo
        .list_dealers_owned_by("user-dealer")
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].name, "Nashik Wheels");
}
