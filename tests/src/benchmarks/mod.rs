//! # Attribution Benchmarks
//!
//! Engine setups shared by `benches/attribution_benchmarks.rs`.

pub mod trigger_handling;
