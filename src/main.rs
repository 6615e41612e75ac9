//! CarMart Backend
//!
//! Serves the used-car marketplace and the PowerDesk console: the API-key
//! guarded request functions, the session-authenticated app API, SQLite
//! persistence and Tantivy listing search.

mod access;
mod api;
mod auth;
mod cache;
mod config;
mod db;
mod effects;
mod errors;
mod integrations;
mod intelligence;
mod models;
mod search;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cache::QueryCache;
use config::Config;
use db::Repository;
use integrations::{
    Geocoder, LogMessenger, Messenger, NominatimGeocoder, PaymentGateway, RazorpayClient,
};
use search::SearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub cache: Arc<QueryCache>,
    pub config: Arc<Config>,
    /// Absent when gateway credentials are not configured
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub geocoder: Arc<dyn Geocoder>,
    pub messenger: Arc<dyn Messenger>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration; a missing API key aborts startup
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CarMart Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Document directory: {:?}", config.document_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    let payments: Option<Arc<dyn PaymentGateway>> = match &config.razorpay {
        Some(razorpay) => Some(Arc::new(RazorpayClient::new(razorpay)?)),
        None => {
            tracing::warn!(
                "Razorpay credentials not configured (CARMART_RAZORPAY_KEY_ID). Payments are disabled!"
            );
            None
        }
    };
    let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(&config.geocoder_url)?);
    let messenger: Arc<dyn Messenger> = Arc::new(LogMessenger);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    // Build initial search index from database
    tracing::info!("Building search index...");
    let listings = repo.list_active_listings().await?;
    search.rebuild(&listings).await?;

    let state = AppState {
        repo,
        search,
        cache: Arc::new(QueryCache::new()),
        config: Arc::new(config.clone()),
        payments,
        geocoder,
        messenger,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let allowed_headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        HeaderName::from_static("x-client-info"),
        HeaderName::from_static("apikey"),
        HeaderName::from_static("x-api-key"),
    ];

    // Fixed CORS policy the web client expects from the function endpoints
    let function_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers(allowed_headers.clone());

    let app_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(allowed_headers);

    let api_key = state.config.api_key.clone();

    // Base64 inflates uploads by a third; leave headroom for the JSON around it
    let body_limit = state.config.max_document_bytes.div_ceil(3) * 4 + 64 * 1024;

    let function_routes = Router::new()
        .route(
            "/create-loan-application",
            post(api::create_loan_application),
        )
        .route("/update-loan-status", post(api::update_loan_status))
        .route(
            "/generate-loan-upload-link",
            post(api::generate_loan_upload_link),
        )
        .route("/upload-loan-document", post(api::upload_loan_document))
        .route("/create-razorpay-order", post(api::create_razorpay_order))
        .route("/notify-dealer", post(api::notify_dealer))
        .route("/reverse-geocode", post(api::reverse_geocode))
        .route("/track-interaction", post(api::track_interaction));

    // API key guarded: the function endpoints and session issuance
    let key_routes = Router::new()
        .nest("/functions", function_routes)
        .route("/api/sessions", post(api::issue_session))
        .layer(
            ServiceBuilder::new()
                .layer(function_cors)
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(middleware::from_fn(move |req, next| {
                    auth::api_key_layer(api_key.clone(), req, next)
                })),
        );

    // Session authenticated app API
    let session_routes = Router::new()
        .route(
            "/api/session",
            get(api::get_session).delete(api::end_session),
        )
        .route("/api/access/check", post(api::check_access))
        .route("/api/notifications", get(api::list_notifications))
        .route(
            "/api/listings",
            get(api::list_listings).post(api::create_listing),
        )
        .route("/api/dealers", post(api::create_dealer))
        .route("/api/dealer/metrics", get(api::get_dealer_metrics))
        .route("/api/enquiries", post(api::create_enquiry))
        .route(
            "/api/enquiries/{id}/status",
            put(api::update_enquiry_status),
        )
        .route("/api/powerdesk/leads/top", get(api::top_leads))
        .route("/api/powerdesk/loans", get(api::list_loans))
        .route(
            "/api/powerdesk/loans/{id}/documents",
            get(api::list_loan_documents),
        )
        .route("/api/powerdesk/funnel", get(api::funnel))
        .route(
            "/api/powerdesk/users/{id}/roles",
            put(api::set_user_roles),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_layer,
        ))
        .layer(app_cors);

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(key_routes)
        .merge(session_routes)
        .merge(health_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
