//! # Attribution Reporting Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Origins, headers and manager builders
//! ├── benchmarks/       # Populated engines shared with the criterion benches
//! └── integration/      # End-to-end scenarios through AttributionManager
//!     ├── attribution_flow.rs  # matching, dedup, eviction, budget
//!     ├── privacy.rs           # noise, null reports, debug keys, determinism
//!     ├── delivery.rs          # sending, retries, policy at send time
//!     └── tooling.rs           # simulator, telemetry, metrics exposition
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ar-tests
//!
//! # By category
//! cargo test -p ar-tests integration::privacy::
//!
//! # Benchmarks
//! cargo bench -p ar-tests
//! ```

pub mod benchmarks;
pub mod fixtures;
pub mod integration;
