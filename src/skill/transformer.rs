//! Per-record validation and hand-off to the enrichment queue.

use crate::queue::{EnrichmentMessage, QueueError, QueueMessage, QueueSender};
use crate::skill::types::{TransformResult, ValidationError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Validates work items and enqueues them for enrichment.
///
/// The only side effect is the queue send; acknowledgment means "accepted", not "enriched".
pub struct RecordTransformer {
    queue: Arc<dyn QueueSender>,
    queue_name: String,
    enqueue_delay: Option<Duration>,
}

impl RecordTransformer {
    /// Send accepted records to `queue_name` through `queue`.
    pub fn new(queue: Arc<dyn QueueSender>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            enqueue_delay: None,
        }
    }

    /// Schedule request messages `delay` into the future instead of delivering immediately.
    pub fn with_enqueue_delay(mut self, delay: Option<Duration>) -> Self {
        self.enqueue_delay = delay;
        self
    }

    /// Transform one raw work item.
    ///
    /// Returns `None` when the item carries no `recordId`: such items are left out of the
    /// response entirely rather than reported as errors.
    pub async fn transform(&self, record: &Value) -> Option<TransformResult> {
        let record_id = record_id(record)?;

        let message = match validate(record) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(record_id = %record_id, error = %error, "Rejected record");
                return Some(TransformResult::failure(record_id, format!("Error:{error}")));
            }
        };

        match self.enqueue(&message).await {
            Ok(()) => {
                tracing::debug!(
                    record_id = %record_id,
                    metadata_storage_path = %message.metadata_storage_path,
                    queue = %self.queue_name,
                    "Record queued for enrichment"
                );
                Some(TransformResult::processing(record_id))
            }
            Err(error) => {
                tracing::warn!(record_id = %record_id, error = %error, "Failed to queue record");
                Some(TransformResult::failure(
                    record_id,
                    format!("Could not complete operation for record. {error}"),
                ))
            }
        }
    }

    async fn enqueue(&self, payload: &EnrichmentMessage) -> Result<(), QueueError> {
        let mut message = QueueMessage::json(payload)?;
        if let Some(delay) = self.enqueue_delay {
            message = message.scheduled_at(OffsetDateTime::now_utc() + delay);
        }
        self.queue.send(&self.queue_name, message).await
    }
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("recordId")? {
        Value::Null => None,
        Value::String(id) => Some(id.clone()),
        other => Some(other.to_string()),
    }
}

/// Check the preconditions in order and stop at the first one that fails.
fn validate(record: &Value) -> Result<EnrichmentMessage, ValidationError> {
    let data = record
        .get("data")
        .and_then(Value::as_object)
        .ok_or(ValidationError::MissingData)?;
    let metadata_storage_path = data
        .get("metadata_storage_path")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingMetadataPath)?;
    let text = data
        .get("text")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingText)?;

    Ok(EnrichmentMessage {
        metadata_storage_path: metadata_storage_path.to_string(),
        text: text.to_string(),
    })
}
