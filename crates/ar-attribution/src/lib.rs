//! # Attribution Reporting Engine
//!
//! On-device attribution measurement: matches earlier ad impressions and
//! clicks ("sources") to later conversions ("triggers") and produces
//! privacy-bounded reports.
//!
//! ## Privacy Mechanisms
//!
//! | Mechanism | Enforcement Location |
//! |-----------|---------------------|
//! | Randomized response fixed at registration | `domain/policy.rs` - `generate_randomized_response()` |
//! | Null aggregatable reports on every trigger | `domain/policy.rs` - `null_aggregatable_reports()` |
//! | Report delay jitter and shuffled reads | `domain/policy.rs`, `domain/scheduler.rs` |
//! | Rolling-window rate limits | `domain/rate_limiter.rs` |
//! | Per-destination caps and priority eviction | `domain/storage.rs` |
//! | Debug keys only with the debug cookie | `service.rs` - `clear_debug_key()` |
//!
//! ## Report Lifecycle
//!
//! ```text
//! [CREATED] ──report_time──→ [DUE] ──send ok──→ [DELETED]
//!                              │
//!                              ├── transient failure ──→ [RESCHEDULED] (backoff)
//!                              └── attempts exhausted / permanent failure ──→ [DROPPED]
//! ```
//!
//! ## Outbound Dependencies
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | `AttributionStore` | Sources, reports and the rate-limit ledger |
//! | `ReportSender` | Network delivery |
//! | `DebugCookieChecker` | Debug-mode gating |
//! | `OperationPolicy` | Embedder veto |
//! | `AttributionObserver` | Change notifications |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - in-memory store, recording sender, observers       │
//! │  service.rs - AttributionManager (lock, policy, delivery)       │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - AttributionApi trait                       │
//! │  ports/outbound.rs - AttributionStore, ReportSender, ...        │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/storage.rs     - AttributionStorage (matching engine)   │
//! │  domain/policy.rs      - randomized response, null reports      │
//! │  domain/rate_limiter.rs - rolling-window limits                 │
//! │  domain/expiry.rs      - expiry and window stamping             │
//! │  domain/registration.rs - header parsing                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::{
    AllowAllPolicy, BlockOriginsPolicy, InMemoryAttributionStore, NoOpObserver, RecordedEvent,
    RecordingObserver, RecordingReportSender, SentReport, StaticDebugCookieChecker,
    TracingObserver,
};
pub use domain::*;
pub use error::*;
pub use ports::*;
pub use service::AttributionManager;
