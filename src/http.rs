use crate::metrics::Metrics;
use crate::snapshot::HardwareSnapshot;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest collected snapshot; `None` until the first collection finishes.
pub type SharedSnapshot = Arc<RwLock<Option<HardwareSnapshot>>>;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub snapshot: SharedSnapshot,
}

pub fn build_router(metrics: Arc<Metrics>, snapshot: SharedSnapshot) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/data", get(data_handler))
        .with_state(HttpAppState { metrics, snapshot })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

async fn data_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_data_requests();
    let guard = state.snapshot.read().await;
    match guard.as_ref() {
        Some(snapshot) => Json(snapshot.clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "данные ещё не собраны").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RamUsage;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    fn snapshot() -> HardwareSnapshot {
        HardwareSnapshot {
            cpu_temp: 48.0,
            gpu_temp: 52.0,
            ram_usage: RamUsage::Numeric(37.2),
            fan_speed: 0.0,
            uptime: "0:10:00".to_string(),
            power_draw: "н/д".to_string(),
            cpu_usage: 7.0,
            gpu_usage: 0.0,
        }
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let metrics = Metrics::new().expect("инициализация метрик");
        let app = build_router(metrics, Arc::new(RwLock::new(None)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn data_is_unavailable_before_first_collect() {
        let metrics = Metrics::new().expect("инициализация метрик");
        let app = build_router(metrics, Arc::new(RwLock::new(None)));

        let response = app
            .oneshot(Request::builder().uri("/data").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn data_returns_snapshot_json() {
        let metrics = Metrics::new().expect("инициализация метрик");
        let shared = Arc::new(RwLock::new(Some(snapshot())));
        let app = build_router(metrics.clone(), shared);

        let response = app
            .oneshot(Request::builder().uri("/data").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let decoded: HardwareSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, snapshot());
        assert_eq!(metrics.hw_data_requests_total.get(), 1.0);
    }

    #[tokio::test]
    async fn metrics_contains_snapshot_gauges() {
        let metrics = Metrics::new().expect("инициализация метрик");
        metrics.update_from_snapshot(&snapshot());
        let app = build_router(metrics.clone(), Arc::new(RwLock::new(None)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("hw_temperature_celsius"));
        assert!(text.contains("hw_scrape_count_total 1"));
    }
}
