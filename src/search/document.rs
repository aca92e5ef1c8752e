//! Index update payloads sent to the document-indexing endpoint.

use crate::search::schema::TypedValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// Action applied to a document by the indexing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexAction {
    /// Update only the supplied fields of an existing document.
    #[serde(rename = "merge")]
    Merge,
}

/// A single document update keyed by its storage path.
#[derive(Debug, Clone, Serialize)]
pub struct IndexUpdateDocument {
    /// Action applied by the index.
    #[serde(rename = "@search.action")]
    pub action: IndexAction,
    /// Document key.
    pub metadata_storage_path: String,
    /// Typed enrichment fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, TypedValue>,
}

impl IndexUpdateDocument {
    /// Build a merge update for the document stored at `metadata_storage_path`.
    pub fn merge(metadata_storage_path: String, fields: BTreeMap<String, TypedValue>) -> Self {
        Self {
            action: IndexAction::Merge,
            metadata_storage_path,
            fields,
        }
    }
}

/// Request body of the document-indexing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct IndexBatch {
    /// Documents updated by this call.
    pub value: Vec<IndexUpdateDocument>,
}

impl IndexBatch {
    /// Wrap one document in a batch.
    pub fn single(document: IndexUpdateDocument) -> Self {
        Self {
            value: vec![document],
        }
    }
}
