//! Contextual insights for Bible study, generated by a locally hosted model.

pub mod cache;
pub mod clients;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod http;
pub mod insights;
pub mod normalizer;
pub mod reference;
pub mod repair;

pub use error::{InsightError, Result};
pub use gateway::InferenceGateway;
pub use insights::{InsightAggregator, InsightKind, InsightOutcome, InsightRequest, InsightResult};
pub use normalizer::ReferenceNormalizer;
pub use reference::Reference;
