//! In-process wave metrics.
//!
//! The recorder is fed by the orchestrator and exported as a serializable
//! snapshot; nothing is persisted or pushed anywhere.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use wave_common::{Phase, PhaseStatus, WaveStatus};

/// Duration statistics for one phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Terminal waves per status.
    pub waves_by_status: BTreeMap<String, u64>,
    /// Attempt durations per phase.
    pub phase_durations_ms: BTreeMap<String, PhaseStats>,
    /// Failed attempts per phase.
    pub phase_failures: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_phase(&self, phase: Phase, status: PhaseStatus, duration: Duration) {
        let Ok(mut metrics) = self.inner.lock() else {
            return;
        };
        let ms = duration.as_millis() as u64;
        let stats = metrics
            .phase_durations_ms
            .entry(phase.as_str().to_string())
            .or_default();
        stats.count += 1;
        stats.total_ms += ms;
        stats.max_ms = stats.max_ms.max(ms);
        if status == PhaseStatus::Failed {
            *metrics
                .phase_failures
                .entry(phase.as_str().to_string())
                .or_default() += 1;
        }
    }

    pub fn record_wave(&self, status: WaveStatus) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics
                .waves_by_status
                .entry(status.as_str().to_string())
                .or_default() += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_phase_stats() {
        let recorder = MetricsRecorder::new();
        recorder.record_phase(Phase::Review, PhaseStatus::Failed, Duration::from_millis(40));
        recorder.record_phase(Phase::Review, PhaseStatus::Succeeded, Duration::from_millis(10));
        recorder.record_wave(WaveStatus::Completed);

        let snap = recorder.snapshot();
        let review = &snap.phase_durations_ms["review"];
        assert_eq!(review.count, 2);
        assert_eq!(review.total_ms, 50);
        assert_eq!(review.max_ms, 40);
        assert_eq!(snap.phase_failures["review"], 1);
        assert_eq!(snap.waves_by_status["completed"], 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let recorder = MetricsRecorder::new();
        recorder.record_wave(WaveStatus::Failed);
        let json = serde_json::to_value(recorder.snapshot()).unwrap();
        assert_eq!(json["waves_by_status"]["failed"], 1);
    }
}
