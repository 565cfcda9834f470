//! # Attribution Engine Benchmarks
//!
//! | Area | Claim |
//! |------|-------|
//! | Trigger matching | Cost follows candidates for the destination |
//! | Null reports | Full lookback stays cheap |

use ar_tests::benchmarks::trigger_handling::{bench_null_reports, bench_trigger_matching};
use criterion::{criterion_group, criterion_main};

criterion_group!(benches, bench_trigger_matching, bench_null_reports);
criterion_main!(benches);
