//! Diagnostic counters.
//!
//! Counters are plain atomics so the decode path never blocks on them. Every
//! increment is mirrored to the `metrics` facade.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use wimod_metrics::metric_defs;
use wimod_metrics::metrics::{self, Label};
use wimod_metrics::{HciLabels, Metric};

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HciStatsSnapshot {
    /// Raw bytes consumed from the transport.
    pub bytes_received: u64,
    /// Raw bytes written to the transport.
    pub bytes_sent: u64,
    /// Candidate frames delimited by the framer.
    pub frames_received: u64,
    /// Frames discarded for bad escapes or excess length.
    pub framing_errors: u64,
    /// Frames rejected by checksum verification.
    pub checksum_errors: u64,
    /// Frames with a valid checksum but an undecodable header.
    pub decode_errors: u64,
    /// Messages dropped for an unregistered SAP id.
    pub unknown_sap: u64,
    /// Responses delivered to pending commands.
    pub responses: u64,
    /// Messages delivered to indication handlers.
    pub indications: u64,
    /// Late responses dropped after cancellation or timeout.
    pub stale_responses: u64,
    /// Commands written to the transport.
    pub commands_sent: u64,
    /// Commands that expired without response.
    pub timeouts: u64,
    /// Commands rejected because their SAP was busy.
    pub busy_rejections: u64,
}

/// Live counters shared by the decode path and command callers.
#[derive(Debug)]
pub(crate) struct HciStats {
    labels: HciLabels,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    frames_received: AtomicU64,
    framing_errors: AtomicU64,
    checksum_errors: AtomicU64,
    decode_errors: AtomicU64,
    unknown_sap: AtomicU64,
    responses: AtomicU64,
    indications: AtomicU64,
    stale_responses: AtomicU64,
    commands_sent: AtomicU64,
    timeouts: AtomicU64,
    busy_rejections: AtomicU64,
}

fn to_metric_labels(pairs: Vec<(&'static str, String)>) -> Vec<Label> {
    pairs.into_iter().map(|(k, v)| Label::new(k, v)).collect()
}

impl HciStats {
    pub(crate) fn new(link: &str) -> Self {
        HciStats {
            labels: HciLabels::new(link),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            checksum_errors: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            unknown_sap: AtomicU64::new(0),
            responses: AtomicU64::new(0),
            indications: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            busy_rejections: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, metric: &Metric, labels: Vec<(&'static str, String)>, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
        metrics::counter!(metric.name, to_metric_labels(labels)).increment(n);
    }

    pub(crate) fn bytes_received(&self, n: usize) {
        Self::bump(&self.bytes_received, &metric_defs::BYTES_RECEIVED, self.labels.to_labels(), n as u64);
    }

    pub(crate) fn bytes_sent(&self, n: usize) {
        Self::bump(&self.bytes_sent, &metric_defs::BYTES_SENT, self.labels.to_labels(), n as u64);
    }

    pub(crate) fn frame_received(&self) {
        Self::bump(&self.frames_received, &metric_defs::FRAMES_RECEIVED, self.labels.to_labels(), 1);
    }

    pub(crate) fn framing_error(&self) {
        Self::bump(&self.framing_errors, &metric_defs::FRAMING_ERRORS, self.labels.to_labels(), 1);
    }

    pub(crate) fn checksum_error(&self) {
        Self::bump(&self.checksum_errors, &metric_defs::CHECKSUM_ERRORS, self.labels.to_labels(), 1);
    }

    pub(crate) fn decode_error(&self) {
        Self::bump(&self.decode_errors, &metric_defs::DECODE_ERRORS, self.labels.to_labels(), 1);
    }

    pub(crate) fn unknown_sap(&self, sap_id: u8) {
        Self::bump(&self.unknown_sap, &metric_defs::UNKNOWN_SAP, self.labels.with_sap(sap_id), 1);
    }

    pub(crate) fn response(&self, sap_id: u8, latency: Duration) {
        Self::bump(&self.responses, &metric_defs::RESPONSES, self.labels.with_sap(sap_id), 1);
        metrics::histogram!(
            metric_defs::COMMAND_LATENCY.name,
            to_metric_labels(self.labels.with_sap(sap_id))
        )
        .record(latency.as_secs_f64() * 1000.0);
    }

    pub(crate) fn indication(&self, sap_id: u8) {
        Self::bump(&self.indications, &metric_defs::INDICATIONS, self.labels.with_sap(sap_id), 1);
    }

    pub(crate) fn stale_response(&self, sap_id: u8) {
        Self::bump(&self.stale_responses, &metric_defs::STALE_RESPONSES, self.labels.with_sap(sap_id), 1);
    }

    pub(crate) fn command_sent(&self, sap_id: u8) {
        Self::bump(&self.commands_sent, &metric_defs::COMMANDS_SENT, self.labels.with_sap(sap_id), 1);
    }

    pub(crate) fn timeout(&self, sap_id: u8) {
        Self::bump(&self.timeouts, &metric_defs::COMMAND_TIMEOUTS, self.labels.with_sap(sap_id), 1);
    }

    pub(crate) fn busy(&self, sap_id: u8) {
        Self::bump(&self.busy_rejections, &metric_defs::BUSY_REJECTIONS, self.labels.with_sap(sap_id), 1);
    }

    pub(crate) fn pending_gauge(&self, pending: usize) {
        metrics::gauge!(
            metric_defs::PENDING_COMMANDS.name,
            to_metric_labels(self.labels.to_labels())
        )
        .set(pending as f64);
    }

    pub(crate) fn snapshot(&self) -> HciStatsSnapshot {
        HciStatsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_sap: self.unknown_sap.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            indications: self.indications.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = HciStats::new("test");
        stats.bytes_received(10);
        stats.bytes_received(5);
        stats.checksum_error();
        stats.unknown_sap(0x09);
        stats.response(0x01, Duration::from_millis(3));

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_received, 15);
        assert_eq!(snap.checksum_errors, 1);
        assert_eq!(snap.unknown_sap, 1);
        assert_eq!(snap.responses, 1);
        assert_eq!(snap.indications, 0);
    }
}
