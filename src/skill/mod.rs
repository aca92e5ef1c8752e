//! Batch request/response protocol: record validation, enqueueing, and the response envelope.

pub mod batch;
pub mod transformer;
pub mod types;

pub use batch::{BatchError, BatchProcessor};
pub use transformer::RecordTransformer;
pub use types::{
    BatchResponse, PROCESSING_STATUS, RecordError, SuccessData, TransformResult, ValidationError,
};
