use axum::{routing, Router};
use metrics_exporter_prometheus::PrometheusHandle;

use cleaner_common::metrics;

pub fn app(metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index));

    match metrics {
        Some(metrics) => metrics::add_metrics_route(router, metrics),
        None => router,
    }
}

pub async fn index() -> &'static str {
    "cron execution cleaner"
}
