//! # Domain Layer - Attribution Engine
//!
//! Pure business logic. Nothing here performs I/O except through the
//! `AttributionStore` port, and time is always a parameter.
//!
//! ## Components
//!
//! - `entities`: Origins, sites, sources, triggers, channel state
//! - `filters`: Filter data and filter-pair matching
//! - `expiry`: Expiry and report-window stamping
//! - `config`: `AttributionConfig` limits and privacy parameters
//! - `combinatorics`: Combinatorial number system for randomized response
//! - `policy`: Randomized response, null reports, delays, report ids
//! - `rate_limiter`: Rolling-window ledger checks
//! - `report`: Report kinds and payloads
//! - `scheduler`: Report times and retry backoff
//! - `outcomes`: Status enums returned by the entry points
//! - `registration`: Registration header parsing
//! - `storage`: `AttributionStorage`, the matcher and report lifecycle

pub mod combinatorics;
pub mod config;
pub mod entities;
pub mod expiry;
pub mod filters;
pub mod outcomes;
pub mod policy;
pub mod rate_limiter;
pub mod registration;
pub mod report;
pub mod scheduler;
pub mod storage;

pub use config::*;
pub use entities::*;
pub use filters::*;
pub use outcomes::*;
pub use policy::AttributionPolicy;
pub use rate_limiter::{RateLimitRow, RateLimitScope, RateLimiter};
pub use report::*;
pub use scheduler::ReportScheduler;
pub use storage::{AttributionStorage, SendFailureOutcome};
