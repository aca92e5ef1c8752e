//! HTTP client wrapper for the search service's document-indexing endpoint.

use crate::config::SearchSettings;
use crate::search::document::IndexBatch;
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Errors returned while talking to the search service.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Endpoint failed to parse or normalize.
    #[error("Invalid search endpoint: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Status and body returned by the indexing endpoint.
#[derive(Debug, Clone)]
pub struct IndexResponse {
    /// HTTP status passed through to callers.
    pub status: StatusCode,
    /// Raw response body, kept for logging.
    pub body: String,
}

/// Lightweight HTTP client for document merges against one index.
pub struct SearchIndexClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) index_name: String,
    pub(crate) api_key: String,
    pub(crate) api_version: String,
}

impl SearchIndexClient {
    /// Construct a client from the search settings.
    pub fn new(settings: &SearchSettings) -> Result<Self, IndexError> {
        let client = Client::builder()
            .user_agent("enrichment-skill/0.1")
            .build()?;
        let base_url = normalize_base_url(&settings.endpoint).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            index = %settings.index_name,
            api_version = %settings.api_version,
            "Initialized search index client"
        );

        Ok(Self {
            client,
            base_url,
            index_name: settings.index_name.clone(),
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    /// Submit a batch to `docs/index`, returning whatever status the service answers with.
    pub async fn index_documents(&self, batch: &IndexBatch) -> Result<IndexResponse, IndexError> {
        let url = format!(
            "{}/indexes/{}/docs/index",
            self.base_url.trim_end_matches('/'),
            self.index_name
        );
        let response = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(IndexResponse { status, body })
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::document::IndexUpdateDocument;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn client_for(server: &MockServer) -> SearchIndexClient {
        SearchIndexClient {
            client: Client::builder()
                .user_agent("enrichment-skill-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            index_name: "docs".into(),
            api_key: "admin-key".into(),
            api_version: "2023-11-01".into(),
        }
    }

    #[tokio::test]
    async fn index_documents_posts_batch_with_api_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/docs/docs/index")
                    .query_param("api-version", "2023-11-01")
                    .header("api-key", "admin-key")
                    .json_body(json!({
                        "value": [{
                            "@search.action": "merge",
                            "metadata_storage_path": "/a"
                        }]
                    }));
                then.status(200).json_body(json!({ "value": [] }));
            })
            .await;

        let response = client_for(&server)
            .index_documents(&IndexBatch::single(IndexUpdateDocument::merge(
                "/a".into(),
                BTreeMap::new(),
            )))
            .await
            .expect("index call");

        mock.assert();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn error_statuses_are_returned_not_raised() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/docs/docs/index");
                then.status(207).body("partial");
            })
            .await;

        let response = client_for(&server)
            .index_documents(&IndexBatch::single(IndexUpdateDocument::merge(
                "/a".into(),
                BTreeMap::new(),
            )))
            .await
            .expect("index call");

        assert_eq!(response.status, StatusCode::MULTI_STATUS);
        assert_eq!(response.body, "partial");
    }

    #[test]
    fn normalizes_trailing_slash_on_path_prefix() {
        assert_eq!(
            normalize_base_url("http://localhost:8080/search/").expect("url"),
            "http://localhost:8080/search"
        );
        assert!(normalize_base_url("not a url").is_err());
    }
}
