#![deny(missing_docs)]

//! Core library for the document enrichment skill.

/// HTTP routing and REST handlers.
pub mod api;
/// Generation backend abstraction, adapters, and retry handling.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Batch outcome counters.
pub mod metrics;
/// Message queue contracts and the Service Bus transport.
pub mod queue;
/// Search index field mapping and document merge.
pub mod search;
/// Batch request/response protocol for the indexer skill.
pub mod skill;
/// Queue-triggered generation and publish stages.
pub mod worker;
