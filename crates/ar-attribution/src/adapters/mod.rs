//! Adapters layer for the attribution engine.
//!
//! In-process implementations of the outbound ports. Embedders supply their
//! own durable store, network sender and cookie jar.

pub mod memory_store;
pub mod observer;
pub mod policy;
pub mod sender;

pub use memory_store::InMemoryAttributionStore;
pub use observer::{NoOpObserver, RecordedEvent, RecordingObserver, TracingObserver};
pub use policy::{AllowAllPolicy, BlockOriginsPolicy, StaticDebugCookieChecker};
pub use sender::{RecordingReportSender, SentReport};
