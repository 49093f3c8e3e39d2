use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use vetclinic_server::{
    api, config::Config, migrator::Migrator, mirror::Synchronizer, views::Views,
};

#[tokio::main]
async fn main() {
    // Load .env if present (dotenvy)
    dotenvy::dotenv().ok();

    vetclinic_server::telemetry::init_telemetry("vetclinic-server");

    let config = Config::load();

    let (prometheus_layer, metric_handle) = axum_prometheus::PrometheusMetricLayer::pair();

    let mut options = ConnectOptions::new(config.database_url.clone());
    options.sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to connect to database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    vetclinic_server::metrics::init_metrics(&db).await;

    let mirror = Synchronizer::from_config(&config.mirror);
    let views = Arc::new(Views::new().expect("Failed to load page templates"));
    let key = api::auth::signing_key(config.secret_key.as_deref());

    let app = with_metrics(
        api::router(db, mirror.clone(), views, key, &config.cors_origin),
        prometheus_layer,
        metric_handle,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind address");
    tracing::info!("listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Give queued mirror writes a chance to land.
    mirror.flush().await;
    tracing::info!("Server stopped");
}

fn with_metrics(
    app: Router,
    prometheus_layer: axum_prometheus::PrometheusMetricLayer<'static>,
    metric_handle: PrometheusHandle,
) -> Router {
    app.layer(prometheus_layer)
        .route("/metrics", get(|| async move { metric_handle.render() }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
