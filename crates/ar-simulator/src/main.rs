//! # ar-simulator
//!
//! Usage: `ar-simulator [input.json]`. Reads the timeline from the file or,
//! without an argument, from stdin, and prints the `SimulationOutput` as
//! pretty JSON on stdout. Logging follows `AR_LOG_LEVEL` / `AR_JSON_LOGS`.

use std::io::Read;

use anyhow::{Context, Result};
use ar_simulator::{parse_input, run_simulation};
use ar_telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_tracing(&telemetry).context("Failed to initialize tracing")?;

    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read simulation input {path}"))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read simulation input from stdin")?;
            buffer
        }
    };

    let input = parse_input(&raw).context("Failed to parse simulation input")?;
    let output = run_simulation(input).await.context("Simulation failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to encode output")?
    );
    Ok(())
}
