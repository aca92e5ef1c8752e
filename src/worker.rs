//! Queue-triggered enrichment stages.
//!
//! Two stages run as independent consumers:
//!
//! - [`GenerationStage`] reads [`EnrichmentMessage`]s from the request queue, calls the
//!   generation backend, and forwards an [`EnrichmentResult`] to the results queue.
//! - [`PublishStage`] reads results and merges them into the search index.
//!
//! [`run`] drives either stage with peek-lock semantics: a message is completed only when its
//! handler succeeds and is abandoned otherwise, so the broker redelivers it.

use crate::completion::{BackendError, CompletionClient};
use crate::queue::{
    EnrichmentMessage, EnrichmentResult, QueueError, QueueMessage, QueueReceiver, QueueSender,
    ReceivedMessage,
};
use crate::search::{IndexError, IndexPublisher};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Long-poll window for each receive call.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Errors that cause a message to be abandoned.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Message body did not decode.
    #[error("Failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),
    /// Generation backend exhausted its retries.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// Forwarding to the next queue failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Search index could not be reached.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Search index answered with a non-success status.
    #[error("Search index rejected the update with status {0}")]
    Rejected(StatusCode),
}

/// Processes one message body.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle `body`; an error leaves the message for redelivery.
    async fn handle(&self, body: &[u8]) -> Result<(), WorkerError>;
}

/// Generates enrichment output and forwards it to the results queue.
pub struct GenerationStage {
    completion: CompletionClient,
    results: Arc<dyn QueueSender>,
    results_queue: String,
}

impl GenerationStage {
    /// Forward results to `results_queue` through `results`.
    pub fn new(
        completion: CompletionClient,
        results: Arc<dyn QueueSender>,
        results_queue: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            results,
            results_queue: results_queue.into(),
        }
    }

    /// Generate output for one message.
    pub async fn enrich(&self, message: &EnrichmentMessage) -> Result<EnrichmentResult, BackendError> {
        let generated = self.completion.generate(&message.text, None).await?;
        let output = parse_generated_output(&generated);
        if output.as_object().is_none() {
            tracing::warn!(
                metadata_storage_path = %message.metadata_storage_path,
                "Generated text is not a JSON object; forwarding empty output"
            );
        }
        Ok(EnrichmentResult {
            metadata_storage_path: message.metadata_storage_path.clone(),
            output,
        })
    }
}

#[async_trait]
impl MessageHandler for GenerationStage {
    async fn handle(&self, body: &[u8]) -> Result<(), WorkerError> {
        let message: EnrichmentMessage = serde_json::from_slice(body)?;
        let result = self.enrich(&message).await?;
        self.results
            .send(&self.results_queue, QueueMessage::json(&result)?)
            .await?;
        tracing::info!(
            metadata_storage_path = %result.metadata_storage_path,
            queue = %self.results_queue,
            "Enrichment result forwarded"
        );
        Ok(())
    }
}

/// Merges enrichment results into the search index.
pub struct PublishStage {
    publisher: IndexPublisher,
}

impl PublishStage {
    /// Publish through `publisher`.
    pub fn new(publisher: IndexPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl MessageHandler for PublishStage {
    async fn handle(&self, body: &[u8]) -> Result<(), WorkerError> {
        let result: EnrichmentResult = serde_json::from_slice(body)?;
        let status = self.publisher.publish(&result).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(WorkerError::Rejected(status))
        }
    }
}

/// Read the generated text as a JSON object, tolerating a fenced code block around it.
///
/// Anything else becomes an empty array, which the publisher treats as "nothing to publish".
pub fn parse_generated_output(generated: &str) -> Value {
    let trimmed = generated.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
        .map(|inner| inner.split_once('\n').map_or(inner, |(_, body)| body))
        .unwrap_or(trimmed);

    match serde_json::from_str::<Value>(unfenced.trim()) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Array(Vec::new()),
    }
}

/// Receive and handle at most one message; returns whether a message was received.
pub async fn process_next(
    receiver: &dyn QueueReceiver,
    queue: &str,
    handler: &dyn MessageHandler,
    timeout: Duration,
) -> Result<bool, QueueError> {
    let Some(message) = receiver.receive(queue, timeout).await? else {
        return Ok(false);
    };
    settle(receiver, queue, handler, &message).await;
    Ok(true)
}

/// Complete or abandon `message` depending on the handler outcome.
///
/// A failed settle call leaves the lock to expire, after which the broker redelivers.
async fn settle(
    receiver: &dyn QueueReceiver,
    queue: &str,
    handler: &dyn MessageHandler,
    message: &ReceivedMessage,
) {
    let (action, settled) = match handler.handle(&message.body).await {
        Ok(()) => ("complete", receiver.complete(queue, message).await),
        Err(error) => {
            tracing::error!(
                queue,
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                error = %error,
                "Message handling failed; abandoning for redelivery"
            );
            ("abandon", receiver.abandon(queue, message).await)
        }
    };

    match settled {
        Ok(()) => tracing::debug!(queue, message_id = %message.message_id, action, "Message settled"),
        Err(error) => tracing::error!(
            queue,
            message_id = %message.message_id,
            action,
            error = %error,
            "Failed to settle message"
        ),
    }
}

/// Consume `queue` until `shutdown` resolves.
pub async fn run<S>(
    receiver: &dyn QueueReceiver,
    queue: &str,
    handler: &dyn MessageHandler,
    shutdown: S,
) where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    tracing::info!(queue, "Worker started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            outcome = process_next(receiver, queue, handler, RECEIVE_TIMEOUT) => {
                if let Err(error) = outcome {
                    tracing::error!(queue, error = %error, "Queue receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                }
            }
        }
    }

    tracing::info!(queue, "Worker stopped");
}
