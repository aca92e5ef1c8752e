//! Batch envelope handling around the record transformer.

use crate::metrics::SkillMetrics;
use crate::skill::transformer::RecordTransformer;
use crate::skill::types::BatchResponse;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors that reject a batch as a whole.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Body was not valid JSON.
    #[error("Malformed batch payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Body had no `values` array.
    #[error("Batch payload is missing the 'values' array")]
    MissingValues,
}

/// Applies the record transformer to every item of a batch, preserving order.
pub struct BatchProcessor {
    transformer: RecordTransformer,
    metrics: Arc<SkillMetrics>,
}

impl BatchProcessor {
    /// Wrap a transformer, recording outcomes into `metrics`.
    pub fn new(transformer: RecordTransformer, metrics: Arc<SkillMetrics>) -> Self {
        Self {
            transformer,
            metrics,
        }
    }

    /// Process a raw `{"values": [...]}` body and return the serialized response envelope.
    pub async fn process_batch(&self, raw: &[u8]) -> Result<String, BatchError> {
        let payload: Value = serde_json::from_slice(raw)?;
        let values = payload
            .get("values")
            .and_then(Value::as_array)
            .ok_or(BatchError::MissingValues)?;
        let response = self.process(values).await;
        Ok(serde_json::to_string(&response)?)
    }

    /// Transform each item in order; items without identity produce no entry.
    pub async fn process(&self, values: &[Value]) -> BatchResponse {
        let mut response = BatchResponse::default();
        for value in values {
            match self.transformer.transform(value).await {
                Some(result) => {
                    self.metrics.record_result(result.is_success());
                    response.values.push(result);
                }
                None => {
                    self.metrics.record_dropped();
                    tracing::debug!("Dropped record without recordId");
                }
            }
        }

        tracing::info!(
            received = values.len(),
            returned = response.values.len(),
            "Batch processed"
        );
        response
    }

    /// Counters accumulated across batches.
    pub fn metrics(&self) -> &SkillMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::transformer::tests::RecordingQueue;
    use serde_json::json;

    fn processor(queue: Arc<RecordingQueue>) -> BatchProcessor {
        BatchProcessor::new(
            RecordTransformer::new(queue, "openai_queue"),
            Arc::new(SkillMetrics::new()),
        )
    }

    #[tokio::test]
    async fn acknowledges_a_valid_record() {
        let queue = Arc::new(RecordingQueue::default());
        let body = json!({
            "values": [{ "recordId": "1", "data": { "metadata_storage_path": "/a", "text": "hello" } }]
        });

        let raw = processor(queue.clone())
            .process_batch(body.to_string().as_bytes())
            .await
            .expect("response");

        let response: Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(
            response,
            json!({ "values": [{ "recordId": "1", "data": { "status": "Processing document" } }] })
        );
        assert_eq!(queue.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn preserves_order_and_omits_records_without_identity() {
        let queue = Arc::new(RecordingQueue::default());
        let processor = processor(queue.clone());
        let values = vec![
            json!({ "recordId": "a", "data": { "metadata_storage_path": "/a", "text": "x" } }),
            json!({ "data": { "metadata_storage_path": "/b", "text": "y" } }),
            json!({ "recordId": "c" }),
            json!({ "recordId": "d", "data": { "metadata_storage_path": "/d", "text": "z" } }),
        ];

        let response = processor.process(&values).await;

        let ids: Vec<&str> = response.values.iter().map(|result| result.record_id()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
        assert!(response.values[0].is_success());
        assert!(!response.values[1].is_success());
        assert!(response.values[2].is_success());

        let snapshot = processor.metrics().snapshot();
        assert_eq!(snapshot.records_accepted, 2);
        assert_eq!(snapshot.records_failed, 1);
        assert_eq!(snapshot.records_dropped, 1);
    }

    #[tokio::test]
    async fn one_failing_record_does_not_block_siblings() {
        let processor = processor(Arc::new(RecordingQueue::failing("queue unavailable")));
        let values = vec![
            json!({ "recordId": "1", "data": { "metadata_storage_path": "/a", "text": "x" } }),
            json!({ "recordId": "2", "data": { "metadata_storage_path": "/b", "text": "y" } }),
        ];

        let response = processor.process(&values).await;
        assert_eq!(response.values.len(), 2);
        assert!(response.values.iter().all(|result| !result.is_success()));
    }

    #[tokio::test]
    async fn missing_values_rejects_the_batch() {
        let processor = processor(Arc::new(RecordingQueue::default()));

        let error = processor
            .process_batch(br#"{"records": []}"#)
            .await
            .expect_err("missing values");
        assert!(matches!(error, BatchError::MissingValues));

        let error = processor
            .process_batch(b"not json")
            .await
            .expect_err("malformed");
        assert!(matches!(error, BatchError::Malformed(_)));
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_values() {
        let raw = processor(Arc::new(RecordingQueue::default()))
            .process_batch(br#"{"values": []}"#)
            .await
            .expect("response");
        assert_eq!(raw, r#"{"values":[]}"#);
    }
}
