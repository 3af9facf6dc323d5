//! Metric declarations for the WiMOD HCI transport core.
//!
//! This crate describes every metric emitted by `wimod-hci` as a structured
//! [`Metric`] constant and re-exports the `metrics` facade so callers do not
//! need a direct dependency on it. Without an installed recorder every emission
//! is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use wimod_metrics::{describe_metrics, metric_defs, HciLabels};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! let labels = HciLabels::new("tcp://127.0.0.1:4000");
//! metrics::counter!(metric_defs::FRAMES_RECEIVED.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use wimod_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("wimod.my_counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["link", "sap"]);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// Use the const constructors to declare metrics at compile time.
///
/// ```rust
/// use wimod_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("wimod.hci.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["link"]);
///
/// assert_eq!(FRAMES.name, "wimod.hci.frames");
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "wimod.hci.frames_received").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }

    /// Returns the unit as a human-readable string.
    pub fn unit_str(&self) -> &'static str {
        match self.unit {
            Some(Unit::Count) => "count",
            Some(Unit::Bytes) => "bytes",
            Some(Unit::Seconds) => "seconds",
            Some(Unit::Milliseconds) => "milliseconds",
            Some(Unit::Microseconds) => "microseconds",
            Some(_) => "other",
            None => "",
        }
    }
}

/// All metric definitions for the HCI core.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels present on every link-scoped metric.
    pub const LINK_LABELS: &[&str] = &["link"];

    /// Labels for metrics broken down per service access point.
    pub const SAP_LABELS: &[&str] = &["link", "sap"];

    // ========================================================================
    // Framing Layer
    // ========================================================================

    /// Raw bytes consumed from the transport.
    pub const BYTES_RECEIVED: Metric = Metric::counter("wimod.hci.bytes_received")
        .with_description("Raw bytes consumed from the transport")
        .with_unit(Unit::Bytes)
        .with_labels(LINK_LABELS);

    /// Raw bytes written to the transport.
    pub const BYTES_SENT: Metric = Metric::counter("wimod.hci.bytes_sent")
        .with_description("Raw bytes written to the transport")
        .with_unit(Unit::Bytes)
        .with_labels(LINK_LABELS);

    /// Candidate frames delimited by the SLIP decoder.
    pub const FRAMES_RECEIVED: Metric = Metric::counter("wimod.hci.frames_received")
        .with_description("Candidate frames delimited by the SLIP decoder")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// In-progress frames discarded because of a bad escape or excess length.
    pub const FRAMING_ERRORS: Metric = Metric::counter("wimod.hci.framing_errors")
        .with_description("Frames discarded due to malformed escapes or excess length")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Frames rejected by CRC16 verification.
    pub const CHECKSUM_ERRORS: Metric = Metric::counter("wimod.hci.checksum_errors")
        .with_description("Frames rejected by CRC16 verification")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// Frames with a valid checksum but an undecodable header.
    pub const DECODE_ERRORS: Metric = Metric::counter("wimod.hci.decode_errors")
        .with_description("Frames with valid checksum but undecodable header")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    // ========================================================================
    // Dispatch Layer
    // ========================================================================

    /// Messages dropped because no SAP is registered for their id.
    pub const UNKNOWN_SAP: Metric = Metric::counter("wimod.hci.unknown_sap")
        .with_description("Messages dropped for an unregistered SAP id")
        .with_unit(Unit::Count)
        .with_labels(SAP_LABELS);

    /// Responses delivered to a waiting command.
    pub const RESPONSES: Metric = Metric::counter("wimod.hci.responses")
        .with_description("Responses delivered to pending commands")
        .with_unit(Unit::Count)
        .with_labels(SAP_LABELS);

    /// Unsolicited messages delivered to indication handlers.
    pub const INDICATIONS: Metric = Metric::counter("wimod.hci.indications")
        .with_description("Unsolicited messages delivered to indication handlers")
        .with_unit(Unit::Count)
        .with_labels(SAP_LABELS);

    /// Late responses dropped after their command was cancelled or timed out.
    pub const STALE_RESPONSES: Metric = Metric::counter("wimod.hci.stale_responses")
        .with_description("Late responses dropped after cancellation or timeout")
        .with_unit(Unit::Count)
        .with_labels(SAP_LABELS);

    /// Commands written to the transport.
    pub const COMMANDS_SENT: Metric = Metric::counter("wimod.hci.commands_sent")
        .with_description("Commands written to the transport")
        .with_unit(Unit::Count)
        .with_labels(SAP_LABELS);

    /// Commands that expired without a matching response.
    pub const COMMAND_TIMEOUTS: Metric = Metric::counter("wimod.hci.command_timeouts")
        .with_description("Commands that expired without a matching response")
        .with_unit(Unit::Count)
        .with_labels(SAP_LABELS);

    /// Commands rejected because the SAP already had one outstanding.
    pub const BUSY_REJECTIONS: Metric = Metric::counter("wimod.hci.busy_rejections")
        .with_description("Commands rejected because the SAP was busy")
        .with_unit(Unit::Count)
        .with_labels(SAP_LABELS);

    /// Time from command transmission to matching response.
    pub const COMMAND_LATENCY: Metric = Metric::histogram("wimod.hci.command_latency_ms")
        .with_description("Time from command transmission to matching response")
        .with_unit(Unit::Milliseconds)
        .with_labels(SAP_LABELS);

    /// Commands currently awaiting a response.
    pub const PENDING_COMMANDS: Metric = Metric::gauge("wimod.hci.pending_commands")
        .with_description("Commands currently awaiting a response")
        .with_unit(Unit::Count)
        .with_labels(LINK_LABELS);

    /// All metrics, for bulk description.
    pub const ALL: &[&Metric] = &[
        &BYTES_RECEIVED,
        &BYTES_SENT,
        &FRAMES_RECEIVED,
        &FRAMING_ERRORS,
        &CHECKSUM_ERRORS,
        &DECODE_ERRORS,
        &UNKNOWN_SAP,
        &RESPONSES,
        &INDICATIONS,
        &STALE_RESPONSES,
        &COMMANDS_SENT,
        &COMMAND_TIMEOUTS,
        &BUSY_REJECTIONS,
        &COMMAND_LATENCY,
        &PENDING_COMMANDS,
    ];
}

/// Labels identifying the link (transport instance) a metric belongs to.
///
/// ```rust
/// use wimod_metrics::HciLabels;
///
/// let labels = HciLabels::new("uart0");
/// let with_sap = labels.with_sap(0x01);
/// assert!(with_sap.iter().any(|(k, v)| *k == "sap" && v == "0x01"));
/// ```
#[derive(Debug, Clone)]
pub struct HciLabels {
    /// Link identifier (port name, bridge address, ...).
    pub link: String,
}

impl HciLabels {
    /// Creates labels for the given link.
    pub fn new(link: impl Into<String>) -> Self {
        Self { link: link.into() }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("link", self.link.clone())]
    }

    /// Returns link labels extended with the SAP id.
    pub fn with_sap(&self, sap_id: u8) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.push(("sap", format!("0x{:02X}", sap_id)));
        labels
    }
}

impl Default for HciLabels {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Describes all metrics used by the HCI core.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
