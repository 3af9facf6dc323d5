//! WiMOD host tool library.
//!
//! Shared pieces of the `wimod` binary: configuration loading, the TCP
//! bridge, logging setup and argument parsing helpers.

pub mod bridge;
pub mod config;
pub mod error;

pub use bridge::{QueueTransport, TcpBridge};
pub use config::{CliConfig, ConnectionConfig};
pub use error::{CliError, CliResult};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects `info` (0),
/// `debug` (1) or `trace` (2+).
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// One line per declared metric: name, kind, unit, labels and description.
pub fn metrics_table() -> String {
    let mut out = String::new();
    for metric in wimod_metrics::metric_defs::ALL {
        let unit = match metric.unit_str() {
            "" => "-",
            unit => unit,
        };
        out.push_str(&format!(
            "{:<34} {:<9} {:<12} {:<10} {}\n",
            metric.name,
            metric.kind,
            unit,
            metric.labels.join(","),
            metric.description
        ));
    }
    out
}

/// Parse a byte given in decimal or `0x` hex.
pub fn parse_u8(text: &str) -> CliResult<u8> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse::<u8>(),
    };
    parsed.map_err(|_| CliError::InvalidArgument(format!("'{}' is not a byte value", text)))
}

/// Parse a hex payload. Spaces, colons and an `0x` prefix are ignored.
pub fn parse_hex_payload(text: &str) -> CliResult<Vec<u8>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let cleaned: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned)
        .map_err(|e| CliError::InvalidArgument(format!("invalid hex payload '{}': {}", text, e)))
}
