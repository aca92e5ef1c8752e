//! Asynchronous work queue: message payloads, transport traits, and the Service Bus adapter.

mod sas;
pub mod service_bus;

pub use service_bus::ServiceBusQueue;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors raised by queue transports.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Connection string was missing a component or could not be parsed.
    #[error("Invalid queue connection string: {0}")]
    InvalidConnectionString(String),
    /// Payload could not be encoded.
    #[error("Failed to encode queue message: {0}")]
    Encode(#[from] serde_json::Error),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Queue service responded with an unexpected status code.
    #[error("Unexpected queue response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the queue service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A received message carried unusable broker metadata.
    #[error("Invalid broker properties: {0}")]
    InvalidBrokerProperties(String),
}

/// Normalized payload placed on the request queue for out-of-band enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentMessage {
    /// Key of the indexed document.
    pub metadata_storage_path: String,
    /// Text to enrich.
    pub text: String,
}

/// Enrichment outcome placed on the results queue for publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Key of the indexed document.
    pub metadata_storage_path: String,
    /// Parsed generation output; an empty array means nothing was produced.
    #[serde(default)]
    pub output: Value,
}

impl EnrichmentResult {
    /// Whether the generation produced nothing worth publishing.
    pub fn is_empty(&self) -> bool {
        match &self.output {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::String(text) => text.trim().is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }
}

/// Encoded message ready to hand to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// JSON body.
    pub body: String,
    /// Earliest delivery time; `None` delivers immediately.
    pub scheduled_enqueue_time: Option<OffsetDateTime>,
}

impl QueueMessage {
    /// Encode `payload` as a JSON message for immediate delivery.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, QueueError> {
        Ok(Self {
            body: serde_json::to_string(payload)?,
            scheduled_enqueue_time: None,
        })
    }

    /// Defer delivery until `at`.
    pub fn scheduled_at(mut self, at: OffsetDateTime) -> Self {
        self.scheduled_enqueue_time = Some(at);
        self
    }
}

/// A message held under a peek-lock until completed or abandoned.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Raw message body.
    pub body: Vec<u8>,
    /// Broker-assigned message identifier.
    pub message_id: String,
    /// Lock token identifying this delivery.
    pub lock_token: String,
    /// Number of times the broker has delivered the message.
    pub delivery_count: u32,
}

/// Capability to submit messages to a named queue.
#[async_trait]
pub trait QueueSender: Send + Sync {
    /// Submit one message.
    async fn send(&self, queue: &str, message: QueueMessage) -> Result<(), QueueError>;
}

/// Capability to consume messages from a named queue with at-least-once semantics.
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Lock the next message, waiting up to `timeout`; `None` when the queue stayed empty.
    async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Remove a processed message from the queue.
    async fn complete(&self, queue: &str, message: &ReceivedMessage) -> Result<(), QueueError>;

    /// Release the lock so the message is delivered again.
    async fn abandon(&self, queue: &str, message: &ReceivedMessage) -> Result<(), QueueError>;
}
