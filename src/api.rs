//! HTTP surface for the enrichment skill.
//!
//! - `POST /api/enrichment` – Batch protocol used by the indexing pipeline. Accepts
//!   `{"values": [{"recordId", "data": {"metadata_storage_path", "text"}}]}` and answers with one
//!   acknowledgment or error entry per identified record.
//! - `GET /metrics` – Batch outcome counters.
//! - `GET /healthz` – Liveness probe.

use crate::skill::{BatchError, BatchProcessor};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the skill endpoints.
pub fn create_router(processor: Arc<BatchProcessor>) -> Router {
    Router::new()
        .route("/api/enrichment", post(enrich_batch))
        .route("/metrics", get(get_metrics))
        .route("/healthz", get(healthz))
        .with_state(processor)
}

/// Run the batch protocol over the raw request body.
async fn enrich_batch(
    State(processor): State<Arc<BatchProcessor>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let response = processor.process_batch(&body).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], response).into_response())
}

async fn get_metrics(State(processor): State<Arc<BatchProcessor>>) -> Response {
    Json(processor.metrics().snapshot()).into_response()
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

struct AppError(BatchError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "Rejected batch request");
        (StatusCode::BAD_REQUEST, self.0.to_string()).into_response()
    }
}

impl From<BatchError> for AppError {
    fn from(inner: BatchError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::SkillMetrics;
    use crate::skill::{BatchProcessor, RecordTransformer};
    use crate::skill::transformer::tests::RecordingQueue;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(queue: Arc<RecordingQueue>) -> axum::Router {
        create_router(Arc::new(BatchProcessor::new(
            RecordTransformer::new(queue, "openai_queue"),
            Arc::new(SkillMetrics::new()),
        )))
    }

    async fn post_batch(app: axum::Router, body: String) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/enrichment")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn batch_route_acknowledges_records() {
        let queue = Arc::new(RecordingQueue::default());
        let payload = json!({
            "values": [
                { "recordId": "1", "data": { "metadata_storage_path": "/a", "text": "hello" } },
                { "data": { "metadata_storage_path": "/b", "text": "orphan" } }
            ]
        });

        let (status, body) = post_batch(app(queue.clone()), payload.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(
            json,
            json!({ "values": [{ "recordId": "1", "data": { "status": "Processing document" } }] })
        );
        assert_eq!(queue.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn batch_route_rejects_payload_without_values() {
        let (status, body) = post_batch(
            app(Arc::new(RecordingQueue::default())),
            json!({ "records": [] }).to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("values"));
    }

    #[tokio::test]
    async fn metrics_route_reports_counters() {
        let app = app(Arc::new(RecordingQueue::default()));
        let payload = json!({ "values": [{ "recordId": "1" }, {}] });
        let (status, _) = post_batch(app.clone(), payload.to_string()).await;
        assert_eq!(status, StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(
            json,
            json!({ "records_accepted": 0, "records_failed": 1, "records_dropped": 1 })
        );
    }
}
