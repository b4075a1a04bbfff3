//! Telemetry aggregation
//!
//! Captures playback events for the end-of-session report:
//! - Buffering count and total stalled time
//! - Quality switches
//! - Player errors, each reported at most once
//!
//! Nothing here touches the network. The terminator reads a snapshot and
//! does the reporting.

use crate::types::ErrorKind;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Telemetry event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Player stalled
    BufferStart,

    /// Player resumed after a stall
    BufferEnd,

    /// Rendition switch, by quality id
    QualityChange { from: u64, to: u64 },

    /// Error raised by the player
    PlaybackError { kind: ErrorKind, message: String },
}

/// A player error as kept by the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub buffering_count: u32,
    pub buffering_duration_ms: u64,
    pub errors: Vec<PlaybackError>,
}

#[derive(Debug, Clone)]
struct ErrorRecord {
    error: PlaybackError,
    reported: bool,
}

/// In-memory telemetry for one session
#[derive(Debug, Default)]
pub struct TelemetryAggregator {
    /// Accepted events in arrival order
    log: Vec<TelemetryEvent>,
    /// Start of the open buffering interval
    buffering_since: Option<Instant>,
    buffering_count: u32,
    buffering_duration_ms: u64,
    quality_switches: u32,
    errors: Vec<ErrorRecord>,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event observed at `at`
    ///
    /// Returns false when the event was dropped: a second `BufferStart` while
    /// already buffering, or a `BufferEnd` with no matching start.
    pub fn record(&mut self, event: TelemetryEvent, at: Instant) -> bool {
        match &event {
            TelemetryEvent::BufferStart => {
                if self.buffering_since.is_some() {
                    trace!("Duplicate buffer start ignored");
                    return false;
                }
                self.buffering_since = Some(at);
            }
            TelemetryEvent::BufferEnd => {
                let Some(since) = self.buffering_since.take() else {
                    trace!("Buffer end without start ignored");
                    return false;
                };
                let elapsed = at.saturating_duration_since(since);
                self.buffering_count += 1;
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                self.buffering_duration_ms = self.buffering_duration_ms.saturating_add(elapsed_ms);
                debug!(
                    elapsed_ms,
                    count = self.buffering_count,
                    "Buffering interval closed"
                );
            }
            TelemetryEvent::QualityChange { .. } => {
                self.quality_switches += 1;
            }
            TelemetryEvent::PlaybackError { kind, message } => {
                self.errors.push(ErrorRecord {
                    error: PlaybackError {
                        kind: *kind,
                        message: message.clone(),
                    },
                    reported: false,
                });
            }
        }

        self.log.push(event);
        true
    }

    /// Close a buffering interval left open, as if it ended at `at`
    pub fn close_open_interval(&mut self, at: Instant) {
        if self.buffering_since.is_some() {
            self.record(TelemetryEvent::BufferEnd, at);
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering_since.is_some()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            buffering_count: self.buffering_count,
            buffering_duration_ms: self.buffering_duration_ms,
            errors: self.errors.iter().map(|r| r.error.clone()).collect(),
        }
    }

    /// Errors not yet handed out, marking them reported
    pub fn take_unreported_errors(&mut self) -> Vec<PlaybackError> {
        self.errors
            .iter_mut()
            .filter(|r| !r.reported)
            .map(|r| {
                r.reported = true;
                r.error.clone()
            })
            .collect()
    }

    pub fn events(&self) -> &[TelemetryEvent] {
        &self.log
    }

    pub fn quality_switches(&self) -> u32 {
        self.quality_switches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_buffering_pairs() {
        let mut telemetry = TelemetryAggregator::new();
        let t0 = Instant::now();

        telemetry.record(TelemetryEvent::BufferStart, t0);
        telemetry.record(TelemetryEvent::BufferEnd, t0 + Duration::from_millis(2000));
        telemetry.record(TelemetryEvent::BufferStart, t0 + Duration::from_millis(5000));
        telemetry.record(TelemetryEvent::BufferEnd, t0 + Duration::from_millis(8000));

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.buffering_count, 2);
        assert_eq!(snapshot.buffering_duration_ms, 5000);
    }

    #[test]
    fn test_duplicate_start_counts_once() {
        let mut telemetry = TelemetryAggregator::new();
        let t0 = Instant::now();

        assert!(telemetry.record(TelemetryEvent::BufferStart, t0));
        assert!(!telemetry.record(TelemetryEvent::BufferStart, t0 + Duration::from_millis(300)));
        telemetry.record(TelemetryEvent::BufferEnd, t0 + Duration::from_millis(1000));

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.buffering_count, 1);
        // Measured from the first start
        assert_eq!(snapshot.buffering_duration_ms, 1000);
        assert_eq!(telemetry.events().len(), 2);
    }

    #[test]
    fn test_unmatched_end_and_backwards_clock() {
        let mut telemetry = TelemetryAggregator::new();
        let t0 = Instant::now() + Duration::from_secs(10);

        assert!(!telemetry.record(TelemetryEvent::BufferEnd, t0));

        telemetry.record(TelemetryEvent::BufferStart, t0);
        // Out-of-order timestamp saturates at zero
        telemetry.record(TelemetryEvent::BufferEnd, t0 - Duration::from_secs(1));

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.buffering_count, 1);
        assert_eq!(snapshot.buffering_duration_ms, 0);
    }

    #[test]
    fn test_errors_reported_once() {
        let mut telemetry = TelemetryAggregator::new();
        let now = Instant::now();
        telemetry.record(
            TelemetryEvent::PlaybackError {
                kind: ErrorKind::Subtitle,
                message: "cue parse failed".into(),
            },
            now,
        );

        assert_eq!(telemetry.take_unreported_errors().len(), 1);
        assert!(telemetry.take_unreported_errors().is_empty());

        telemetry.record(
            TelemetryEvent::PlaybackError {
                kind: ErrorKind::Audio,
                message: "track missing".into(),
            },
            now,
        );
        let pending = telemetry.take_unreported_errors();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ErrorKind::Audio);

        // Snapshot keeps everything
        assert_eq!(telemetry.snapshot().errors.len(), 2);
    }

    #[test]
    fn test_close_open_interval() {
        let mut telemetry = TelemetryAggregator::new();
        let t0 = Instant::now();
        telemetry.record(TelemetryEvent::BufferStart, t0);
        telemetry.close_open_interval(t0 + Duration::from_millis(750));
        telemetry.close_open_interval(t0 + Duration::from_millis(900));

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.buffering_count, 1);
        assert_eq!(snapshot.buffering_duration_ms, 750);
        assert!(!telemetry.is_buffering());
    }

    #[test]
    fn test_event_serialization() {
        let event = TelemetryEvent::QualityChange { from: 3, to: 2 };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({ "event": "quality_change", "from": 3, "to": 2 })
        );
    }
}
