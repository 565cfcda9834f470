//! Error types for the attribution engine.
//!
//! Expected rejections (rate limits, capacity, dedup, policy) are NOT errors:
//! they travel in the result enums of `domain::outcomes`. The types here
//! cover failures of collaborators and malformed input.

use crate::domain::entities::SourceId;
use crate::domain::report::ReportId;
use thiserror::Error;

/// Durable store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Source not found: {0}")]
    SourceNotFound(SourceId),

    #[error("Report not found: {0}")]
    ReportNotFound(ReportId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Batch write rejected: {0}")]
    BatchRejected(String),
}

/// Registration header parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Header is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Header must be a JSON dictionary")]
    RootWrongType,

    #[error("Missing or invalid destination")]
    DestinationMissing,

    #[error("Destination `{0}` is not a URL")]
    InvalidDestination(String),

    #[error("Too many destinations: {count} > {max}")]
    TooManyDestinations { count: usize, max: usize },

    #[error("Field `{field}` has the wrong type")]
    WrongType { field: &'static str },

    #[error("Field `{field}` is not a valid integer")]
    InvalidInteger { field: &'static str },

    #[error("Filter data uses reserved key `{key}`")]
    ReservedFilterKey { key: String },

    #[error("Too many filter keys: {count} > {max}")]
    TooManyFilterKeys { count: usize, max: usize },

    #[error("Aggregation key `{key}` is not a valid 128-bit hex value")]
    InvalidAggregationKey { key: String },

    #[error("Too many aggregation keys: {count} > {max}")]
    TooManyAggregationKeys { count: usize, max: usize },

    #[error("Too many event trigger data entries: {count} > {max}")]
    TooManyEventTriggers { count: usize, max: usize },

    #[error("Aggregatable value for `{key}` out of range: {value}")]
    AggregatableValueOutOfRange { key: String, value: u64 },

    #[error("Unknown aggregation coordinator: {0}")]
    UnknownCoordinator(String),
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Configuration is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Probability `{field}` out of range: {value}")]
    InvalidProbability { field: &'static str, value: f64 },

    #[error("`{field}` must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("Invalid epsilon: {0}")]
    InvalidEpsilon(f64),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum AttributionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for engine operations.
pub type AttributionResult<T> = Result<T, AttributionError>;
