//! # Integration Scenarios
//!
//! End-to-end flows through `AttributionManager`: registration headers in,
//! results, observer events and delivered reports out.

pub mod attribution_flow;
pub mod delivery;
pub mod privacy;
pub mod tooling;
