//! Poll hardware telemetry and print each snapshot.
//!
//! Usage:
//!
//! ```text
//! cargo run --example poll -- [config.yaml]
//! RUST_LOG=sensortap=debug cargo run --example poll
//! ```
//!
//! Without a config file the demo samples the four logical metrics from
//! shared memory, falling back to `whinfo.CSV` logs in the current directory.

use futures::StreamExt;
use sensortap::{LogLocation, PollOptions, SensorTap, TelemetryConfig, sample_stream};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TelemetryConfig::from_file(path)?,
        None => {
            let mut config = TelemetryConfig::default();
            config.labels = ["cpu_usage", "cpu_power", "gpu_usage", "gpu_power"]
                .iter()
                .map(sensortap::Label::new)
                .collect();
            config.backend.log = Some(LogLocation::newest(".", "whinfo.CSV"));
            config
        }
    };

    let source = SensorTap::from_config(&config)?;
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut snapshots = sample_stream(source, PollOptions::from_config(&config), cancel);
    while let Some(result) = snapshots.next().await {
        let snapshot = result?;
        let line: Vec<String> =
            snapshot.iter().map(|(label, value)| format!("{label}={value:.2}")).collect();
        match snapshot.row_time() {
            Some(row_time) => println!("[{row_time}] {}", line.join("  ")),
            None => println!("[{}] {}", snapshot.captured_at_ms(), line.join("  ")),
        }
    }

    Ok(())
}
