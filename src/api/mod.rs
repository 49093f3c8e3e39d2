pub mod admin;
pub mod auth;
pub mod middleware;
pub mod owners;
pub mod pages;
pub mod payments;
pub mod pets;
pub mod veterinarians;
pub mod visits;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Extension, Router,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::lifecycle::RecordView;
use crate::mirror::Synchronizer;
use crate::views::Views;

/// `?view=active|inactive|all`, active when absent.
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub view: RecordView,
}

/// Fills the request span fields declared in [`router`].
pub(crate) fn record_action(table: &str, action: &str, record_id: Option<i32>, event: &str) {
    let span = tracing::Span::current();
    span.record("table", table)
        .record("action", action)
        .record("business_event", event);
    if let Some(id) = record_id {
        span.record("record_id", id);
    }
}

async fn health_check() -> &'static str {
    "OK"
}

fn cors(origin: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(origin).unwrap_or_else(|_| {
        tracing::warn!("Invalid CORS_ORIGIN {:?}, falling back to localhost", origin);
        HeaderValue::from_static("http://localhost:3000")
    });

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Every route except `/metrics`, which needs the process-wide recorder and is
/// added by the server binary.
pub fn router(
    db: DatabaseConnection,
    mirror: Synchronizer,
    views: Arc<Views>,
    key: Key,
    cors_origin: &str,
) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/login", get(pages::login_form).post(pages::login_submit));

    let api_routes = Router::new()
        .route(
            "/api/owners",
            get(owners::list_owners).post(owners::create_owner),
        )
        .route(
            "/api/owners/:id",
            get(owners::get_owner)
                .patch(owners::update_owner)
                .delete(owners::delete_owner),
        )
        .route("/api/owners/:id/restore", post(owners::restore_owner))
        .route("/api/owners/:id/pets", get(owners::list_owner_pets))
        .route(
            "/api/veterinarians",
            get(veterinarians::list_veterinarians).post(veterinarians::create_veterinarian),
        )
        .route(
            "/api/veterinarians/:id",
            get(veterinarians::get_veterinarian)
                .patch(veterinarians::update_veterinarian)
                .delete(veterinarians::delete_veterinarian),
        )
        .route(
            "/api/veterinarians/:id/restore",
            post(veterinarians::restore_veterinarian),
        )
        .route(
            "/api/veterinarians/:id/visits",
            get(veterinarians::list_veterinarian_visits),
        )
        .route("/api/pets", get(pets::list_pets).post(pets::create_pet))
        .route(
            "/api/pets/:id",
            get(pets::get_pet)
                .patch(pets::update_pet)
                .delete(pets::delete_pet),
        )
        .route("/api/pets/:id/restore", post(pets::restore_pet))
        .route("/api/pets/:id/visits", get(pets::list_pet_visits))
        .route("/api/visits", get(visits::list_visits).post(visits::create_visit))
        .route(
            "/api/visits/:id",
            get(visits::get_visit)
                .patch(visits::update_visit)
                .delete(visits::delete_visit),
        )
        .route("/api/visits/:id/restore", post(visits::restore_visit))
        .route("/api/visits/:id/payments", get(visits::list_visit_payments))
        .route(
            "/api/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route(
            "/api/payments/:id",
            get(payments::get_payment)
                .patch(payments::update_payment)
                .delete(payments::delete_payment),
        )
        .route("/api/payments/:id/restore", post(payments::restore_payment))
        .route("/api/summary", get(admin::summary))
        .route("/api/admin/:table/:id", delete(admin::purge_record))
        .route_layer(axum::middleware::from_fn(middleware::require_user));

    let page_routes = Router::new()
        .route("/", get(pages::dashboard))
        .route("/:table", get(pages::listing).post(pages::create_record))
        .route("/:table/:id/delete", post(pages::delete_record))
        .route("/:table/:id/restore", post(pages::restore_record))
        .route_layer(axum::middleware::from_fn(middleware::require_page_user));

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes)
        .merge(api_routes)
        .merge(page_routes)
        .layer(Extension(db))
        .layer(Extension(mirror))
        .layer(Extension(views))
        .layer(Extension(key))
        .layer(CookieManagerLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<axum::body::Body>| {
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched| matched.as_str());

                    let span_name = match matched_path {
                        Some(path) => format!("{} {}", request.method(), path),
                        None => format!("{} {}", request.method(), request.uri().path()),
                    };

                    let client_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .or_else(|| request.headers().get("x-real-ip"))
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");

                    tracing::info_span!(
                        "request",
                        "otel.name" = span_name,
                        client_ip = client_ip,
                        method = ?request.method(),
                        uri = ?request.uri(),
                        // Recorded by handlers
                        table = tracing::field::Empty,
                        action = tracing::field::Empty,
                        record_id = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        business_event = tracing::field::Empty,
                        error = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency = tracing::field::Empty,
                    )
                })
                .on_request(
                    |_request: &axum::http::Request<axum::body::Body>, _span: &tracing::Span| {},
                )
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record("status", tracing::field::display(response.status()));
                        span.record("latency", tracing::field::debug(latency));
                        tracing::info!("request completed");
                    },
                ),
        )
        .layer(cors(cors_origin))
}
