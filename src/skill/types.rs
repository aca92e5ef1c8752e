//! Wire types of the batch request/response protocol.

use serde::Serialize;
use std::fmt;

/// Status reported for every record accepted onto the enrichment queue.
pub const PROCESSING_STATUS: &str = "Processing document";

/// Outcome of transforming a single work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TransformResult {
    /// Record accepted; enrichment continues asynchronously.
    Success {
        /// Identifier echoed from the request.
        #[serde(rename = "recordId")]
        record_id: String,
        /// Acknowledgment payload.
        data: SuccessData,
    },
    /// Record rejected or could not be queued.
    Failure {
        /// Identifier echoed from the request.
        #[serde(rename = "recordId")]
        record_id: String,
        /// Ordered error entries; the transformer always reports exactly one.
        errors: Vec<RecordError>,
    },
}

impl TransformResult {
    /// Acknowledge `record_id` as queued for enrichment.
    pub fn processing(record_id: String) -> Self {
        Self::Success {
            record_id,
            data: SuccessData {
                status: PROCESSING_STATUS.to_string(),
            },
        }
    }

    /// Report a single error for `record_id`.
    pub fn failure(record_id: String, message: impl Into<String>) -> Self {
        Self::Failure {
            record_id,
            errors: vec![RecordError {
                message: message.into(),
            }],
        }
    }

    /// Identifier echoed from the request.
    pub fn record_id(&self) -> &str {
        match self {
            Self::Success { record_id, .. } | Self::Failure { record_id, .. } => record_id,
        }
    }

    /// Whether the record was accepted.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Acknowledgment payload of a successful record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessData {
    /// Human-readable status.
    pub status: String,
}

/// One error entry of a failed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordError {
    /// Error description.
    pub message: String,
}

/// Response envelope of a batch call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResponse {
    /// Results in request order, with identity-less records omitted.
    pub values: Vec<TransformResult>,
}

/// First unmet precondition of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `data` is absent or not an object.
    MissingData,
    /// `data.metadata_storage_path` is absent or not a string.
    MissingMetadataPath,
    /// `data.text` is absent or not a string.
    MissingText,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingData => f.write_str("'data' field is required."),
            Self::MissingMetadataPath => {
                f.write_str("'metadata_storage_path' field is required in 'data' object.")
            }
            Self::MissingText => f.write_str("'text' field is required in 'data' object."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_success_and_failure_shapes() {
        let response = BatchResponse {
            values: vec![
                TransformResult::processing("1".into()),
                TransformResult::failure("2".into(), "Error:'data' field is required."),
            ],
        };

        assert_eq!(
            serde_json::to_value(&response).expect("json"),
            json!({
                "values": [
                    { "recordId": "1", "data": { "status": "Processing document" } },
                    { "recordId": "2", "errors": [{ "message": "Error:'data' field is required." }] }
                ]
            })
        );
    }
}
