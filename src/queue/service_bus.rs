//! Service Bus queue transport over the REST API.
//!
//! Sending posts to `{namespace}/{queue}/messages`. Receiving uses peek-lock
//! (`POST {queue}/messages/head`) so a message is only removed once its handler succeeded;
//! abandoning releases the lock and lets the broker redeliver it.

use crate::queue::sas::sas_token;
use crate::queue::{QueueError, QueueMessage, QueueReceiver, QueueSender, ReceivedMessage};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

const BROKER_PROPERTIES: &str = "BrokerProperties";
const TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Service Bus namespace client authenticated with a shared access key.
pub struct ServiceBusQueue {
    pub(crate) client: Client,
    pub(crate) namespace_url: String,
    pub(crate) key_name: String,
    pub(crate) key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutgoingBrokerProperties {
    message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled_enqueue_time_utc: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IncomingBrokerProperties {
    message_id: String,
    lock_token: String,
    #[serde(default)]
    delivery_count: u32,
}

impl ServiceBusQueue {
    /// Build a client from an `Endpoint=sb://...;SharedAccessKeyName=...;SharedAccessKey=...`
    /// connection string.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, QueueError> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;

        for part in connection_string.split(';').map(str::trim) {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            match name {
                "Endpoint" => endpoint = Some(value.to_string()),
                "SharedAccessKeyName" => key_name = Some(value.to_string()),
                "SharedAccessKey" => key = Some(value.to_string()),
                _ => {}
            }
        }

        let missing = |name: &str| QueueError::InvalidConnectionString(format!("missing {name}"));
        let endpoint = endpoint.ok_or_else(|| missing("Endpoint"))?;
        let namespace_url = normalize_endpoint(&endpoint)?;
        let client = Client::builder()
            .user_agent("enrichment-skill/0.1")
            .build()?;

        tracing::debug!(namespace = %namespace_url, "Initialized Service Bus client");
        Ok(Self {
            client,
            namespace_url,
            key_name: key_name.ok_or_else(|| missing("SharedAccessKeyName"))?,
            key: key.ok_or_else(|| missing("SharedAccessKey"))?,
        })
    }

    fn request(&self, method: Method, queue: &str, path: &str) -> Result<RequestBuilder, QueueError> {
        let resource = format!("{}/{queue}", self.namespace_url);
        let expiry = OffsetDateTime::now_utc().unix_timestamp() + TOKEN_TTL.as_secs() as i64;
        let token = sas_token(&resource, &self.key_name, &self.key, expiry)?;
        Ok(self
            .client
            .request(method, format!("{resource}/{path}"))
            .header(reqwest::header::AUTHORIZATION, token))
    }

    fn lock_path(message: &ReceivedMessage) -> String {
        format!(
            "messages/{}/{}",
            urlencoding::encode(&message.message_id),
            urlencoding::encode(&message.lock_token)
        )
    }
}

#[async_trait]
impl QueueSender for ServiceBusQueue {
    async fn send(&self, queue: &str, message: QueueMessage) -> Result<(), QueueError> {
        let properties = OutgoingBrokerProperties {
            message_id: Uuid::new_v4().to_string(),
            scheduled_enqueue_time_utc: message
                .scheduled_enqueue_time
                .map(format_rfc1123)
                .transpose()?,
        };

        let response = self
            .request(Method::POST, queue, "messages")?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(BROKER_PROPERTIES, serde_json::to_string(&properties)?)
            .body(message.body)
            .send()
            .await?;

        ensure_success(response).await?;
        tracing::debug!(
            queue,
            message_id = %properties.message_id,
            scheduled = properties.scheduled_enqueue_time_utc.is_some(),
            "Message sent"
        );
        Ok(())
    }
}

#[async_trait]
impl QueueReceiver for ServiceBusQueue {
    async fn receive(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let response = self
            .request(Method::POST, queue, "messages/head")?
            .query(&[("timeout", timeout.as_secs().max(1))])
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::UnexpectedStatus { status, body });
        }

        let properties = response
            .headers()
            .get(BROKER_PROPERTIES)
            .ok_or_else(|| QueueError::InvalidBrokerProperties("header missing".into()))?
            .to_str()
            .map_err(|error| QueueError::InvalidBrokerProperties(error.to_string()))?;
        let properties: IncomingBrokerProperties = serde_json::from_str(properties)
            .map_err(|error| QueueError::InvalidBrokerProperties(error.to_string()))?;
        let body = response.bytes().await?.to_vec();

        tracing::debug!(
            queue,
            message_id = %properties.message_id,
            delivery_count = properties.delivery_count,
            "Message locked"
        );
        Ok(Some(ReceivedMessage {
            body,
            message_id: properties.message_id,
            lock_token: properties.lock_token,
            delivery_count: properties.delivery_count,
        }))
    }

    async fn complete(&self, queue: &str, message: &ReceivedMessage) -> Result<(), QueueError> {
        let response = self
            .request(Method::DELETE, queue, &Self::lock_path(message))?
            .send()
            .await?;
        ensure_success(response).await
    }

    async fn abandon(&self, queue: &str, message: &ReceivedMessage) -> Result<(), QueueError> {
        let response = self
            .request(Method::PUT, queue, &Self::lock_path(message))?
            .send()
            .await?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: Response) -> Result<(), QueueError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = QueueError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Service Bus request failed");
    Err(error)
}

fn normalize_endpoint(endpoint: &str) -> Result<String, QueueError> {
    let endpoint = match endpoint.strip_prefix("sb://") {
        Some(rest) => format!("https://{rest}"),
        None => endpoint.to_string(),
    };
    let parsed = reqwest::Url::parse(&endpoint)
        .map_err(|error| QueueError::InvalidConnectionString(error.to_string()))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn format_rfc1123(at: OffsetDateTime) -> Result<String, QueueError> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map_err(|error| QueueError::InvalidBrokerProperties(error.to_string()))
}
