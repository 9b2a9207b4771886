//! Route definitions for the Field Workforce Attendance Platform
//!
//! Protected routers carry the middleware chain in order: authenticate,
//! attach the city scope, then (for scoped listings and reports) gate on a
//! non-empty scope. Per-endpoint `(module, action)` checks run inside the
//! handlers, which receive that permission's city scope as a value.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::middleware::{attach_city_scope, authenticate, require_city_scope};
use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (login public, session routes protected)
        .nest("/auth", auth_routes(state.clone()))
        // RBAC administration
        .nest("/rbac", rbac_routes(state.clone()))
        // Master data (city-scoped listings)
        .merge(master_routes(state.clone()))
        // Attendance records and reports
        .nest("/attendance", attendance_routes(state.clone()))
        // Mobile punch surface
        .nest("/app/attendance/employee", app_routes(state.clone()))
        // Messaging gateway forwarder
        .nest("/whatsapp", whatsapp_routes(state))
}

/// Wrap a router in the full scope chain: authenticate → attach city scope
/// → reject empty scopes
fn scoped(state: &AppState, router: Router<AppState>) -> Router<AppState> {
    router
        .route_layer(middleware::from_fn(require_city_scope))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            attach_city_scope,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
}

/// Wrap a router in authentication only
fn authed(state: &AppState, router: Router<AppState>) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
}

fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::login))
        .route("/supervisor-login", post(handlers::supervisor_login))
        .merge(authed(
            &state,
            Router::new()
                .route("/me", get(handlers::me))
                .route("/logout", post(handlers::logout)),
        ))
}

fn rbac_routes(state: AppState) -> Router<AppState> {
    authed(
        &state,
        Router::new()
            .route(
                "/permissions",
                get(handlers::list_permissions).post(handlers::create_permission),
            )
            .route(
                "/permissions/:permission_id",
                put(handlers::update_permission).delete(handlers::delete_permission),
            )
            .route(
                "/roles",
                get(handlers::list_roles).post(handlers::create_role),
            )
            .route(
                "/roles/:role_id",
                get(handlers::get_role)
                    .put(handlers::update_role)
                    .delete(handlers::delete_role),
            )
            .route("/users", get(handlers::list_users))
            .route("/users/:user_id/access", put(handlers::update_user_access)),
    )
}

fn master_routes(state: AppState) -> Router<AppState> {
    // City-scoped listings gate on a non-empty scope; classification
    // lookups only need a session
    scoped(
        &state,
        Router::new()
            .route("/cities", get(handlers::list_cities))
            .route("/zones", get(handlers::list_zones))
            .route("/wards", get(handlers::list_wards)),
    )
    .merge(authed(
        &state,
        Router::new()
            .route("/departments", get(handlers::list_departments))
            .route("/designations", get(handlers::list_designations)),
    ))
}

fn attendance_routes(state: AppState) -> Router<AppState> {
    authed(
        &state,
        Router::new().route("/", post(handlers::create_attendance)),
    )
    .merge(scoped(
        &state,
        Router::new()
            .route("/download", get(handlers::download_report))
            .route("/short-report", get(handlers::short_report)),
    ))
}

fn app_routes(state: AppState) -> Router<AppState> {
    authed(
        &state,
        Router::new()
            .route(
                "/",
                post(handlers::app_create_attendance).put(handlers::app_punch),
            )
            .route("/face-attendance", post(handlers::face_attendance))
            .route("/image", get(handlers::attendance_image))
            .route("/faceRoutes/store-face", post(handlers::store_face))
            .route("/faceRoutes/:emp_id", delete(handlers::delete_face)),
    )
}

fn whatsapp_routes(state: AppState) -> Router<AppState> {
    authed(
        &state,
        Router::new().route("/report", post(handlers::send_report)),
    )
}
