//! Publishes enrichment results to the search index as merge updates.

use crate::config::SearchSettings;
use crate::queue::EnrichmentResult;
use crate::search::client::{IndexError, SearchIndexClient};
use crate::search::document::{IndexBatch, IndexUpdateDocument};
use crate::search::schema::{SchemaError, build_typed_fields};
use reqwest::StatusCode;

/// Turns enrichment results into typed merge updates against one index.
///
/// No retry happens here: the merge is idempotent and redelivery is left to the queue.
pub struct IndexPublisher {
    client: SearchIndexClient,
    prompt_keys: String,
}

impl IndexPublisher {
    /// Wrap an index client with the field-spec string used for every document.
    pub fn new(client: SearchIndexClient, prompt_keys: impl Into<String>) -> Self {
        Self {
            client,
            prompt_keys: prompt_keys.into(),
        }
    }

    /// Build the index client and publisher from search settings.
    pub fn from_settings(settings: &SearchSettings) -> Result<Self, IndexError> {
        Ok(Self::new(
            SearchIndexClient::new(settings)?,
            settings.prompt_keys.clone(),
        ))
    }

    /// Merge `result` into the index and return the index's status code.
    ///
    /// Empty output short-circuits with `200 OK`; a schema mismatch yields
    /// `500 Internal Server Error`. Neither contacts the index.
    pub async fn publish(&self, result: &EnrichmentResult) -> Result<StatusCode, IndexError> {
        let path = result.metadata_storage_path.as_str();
        if result.is_empty() {
            tracing::info!(
                metadata_storage_path = path,
                "No output from the generation backend; skipping document"
            );
            return Ok(StatusCode::OK);
        }

        let document = match self.build_document(result) {
            Ok(document) => document,
            Err(error) => {
                tracing::error!(metadata_storage_path = path, error = %error, "Enrichment output does not match the index schema");
                return Ok(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let response = self
            .client
            .index_documents(&IndexBatch::single(document))
            .await?;
        tracing::info!(
            metadata_storage_path = path,
            status = response.status.as_u16(),
            body = %response.body,
            "Search index responded"
        );
        Ok(response.status)
    }

    /// Build the merge document for `result` without sending it.
    pub fn build_document(
        &self,
        result: &EnrichmentResult,
    ) -> Result<IndexUpdateDocument, SchemaError> {
        let output = result.output.as_object().ok_or(SchemaError::NotAnObject)?;
        let fields = build_typed_fields(&self.prompt_keys, output)?;
        Ok(IndexUpdateDocument::merge(
            result.metadata_storage_path.clone(),
            fields,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use reqwest::Client;
    use serde_json::{Value, json};

    fn publisher_for(server: &MockServer, prompt_keys: &str) -> IndexPublisher {
        IndexPublisher::new(
            SearchIndexClient {
                client: Client::builder()
                    .user_agent("enrichment-skill-test")
                    .build()
                    .expect("client"),
                base_url: server.base_url(),
                index_name: "docs".into(),
                api_key: "admin-key".into(),
                api_version: "2023-11-01".into(),
            },
            prompt_keys,
        )
    }

    fn result(output: Value) -> EnrichmentResult {
        EnrichmentResult {
            metadata_storage_path: "/a".into(),
            output,
        }
    }

    #[tokio::test]
    async fn empty_output_returns_ok_without_calling_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;

        let status = publisher_for(&server, "summary:Edm.String:x")
            .publish(&result(json!([])))
            .await
            .expect("publish");

        assert_eq!(status, StatusCode::OK);
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn merges_typed_fields_keyed_by_storage_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/docs/docs/index")
                    .json_body(json!({
                        "value": [{
                            "@search.action": "merge",
                            "metadata_storage_path": "/a",
                            "summary": "Refund issued",
                            "satisfied": true
                        }]
                    }));
                then.status(200).json_body(json!({ "value": [{ "status": true }] }));
            })
            .await;

        let status = publisher_for(&server, "summary:Edm.String:x,satisfied:Edm.Boolean:x")
            .publish(&result(json!({ "summary": "Refund issued", "satisfied": "Yes" })))
            .await
            .expect("publish");

        mock.assert();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_type_returns_500_without_calling_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;

        let status = publisher_for(&server, "summary:Edm.Geography:x")
            .publish(&result(json!({ "summary": "x" })))
            .await
            .expect("publish");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn passes_index_status_through() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/docs/docs/index");
                then.status(404).body("index not found");
            })
            .await;

        let status = publisher_for(&server, "summary")
            .publish(&result(json!({ "summary": "x" })))
            .await
            .expect("publish");

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
