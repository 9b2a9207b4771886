//! Field Workforce Attendance Platform - Backend Server
//!
//! Multi-tenant attendance backend: face-verified punch-in/punch-out for
//! field workers, a dynamic role/permission model with per-user city and
//! zone scopes, and scope-filtered operational reporting.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod external;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;

pub use config::Config;

use external::{FaceClient, StorageRouter, WhatsAppClient};
use services::{
    AttendanceService, AuthService, EnrollmentService, MasterService, PermissionResolver,
    PunchService, RbacService, ReportService,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub permissions: PermissionResolver,
    pub auth: AuthService,
    pub rbac: RbacService,
    pub master: MasterService,
    pub attendance: AttendanceService,
    pub punch: PunchService,
    pub enrollment: EnrollmentService,
    pub reports: ReportService,
    pub storage: Arc<StorageRouter>,
    pub messaging: WhatsAppClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attendance_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    tracing::info!("Starting Field Workforce Attendance Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Schema and RBAC catalogue, once per process
    db::bootstrap(&db_pool, &config).await?;

    // Create application state
    let state = build_state(db_pool, config.clone()).await?;

    // Build application
    let app = create_app(state, &config);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire clients and services into the shared state
async fn build_state(db: sqlx::PgPool, config: Config) -> anyhow::Result<AppState> {
    let permissions = PermissionResolver::new();
    let storage = Arc::new(StorageRouter::from_config(&config.storage).await?);
    let face = FaceClient::new(&config.face);
    let messaging = WhatsAppClient::new(&config.messaging);

    let attendance = AttendanceService::new(db.clone(), &config);
    let auth = AuthService::new(db.clone(), permissions.clone(), &config);
    let rbac = RbacService::new(db.clone(), permissions.clone());
    let master = MasterService::new(db.clone());
    let punch = PunchService::new(attendance.clone(), face.clone(), storage.clone(), &config);
    let enrollment = EnrollmentService::new(db.clone(), face, storage.clone(), &config);
    let reports = ReportService::new(db.clone());

    Ok(AppState {
        db,
        config: Arc::new(config),
        permissions,
        auth,
        rbac,
        master,
        attendance,
        punch,
        enrollment,
        reports,
        storage,
        messaging,
    })
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState, config: &Config) -> Router {
    let origins: Vec<HeaderValue> = config
        .cors
        .origins()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    // Cookie auth needs credentials, so origins are an explicit allowlist
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-access-token"),
        ])
        .allow_credentials(true);

    Router::new()
        .route("/", get(root))
        .nest("/api", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Field Workforce Attendance Platform API v1.0"
}
