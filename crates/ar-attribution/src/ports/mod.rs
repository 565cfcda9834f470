//! Ports layer for the attribution engine.
//!
//! Defines the hexagonal architecture port traits:
//! - Inbound (Driving) ports: API exposed to the embedder
//! - Outbound (Driven) ports: storage, delivery, policy and observers

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
