//! Process-wide counters shared by concurrent requests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::chain::ChainState;

#[derive(Debug, Default)]
struct StageCounters {
    runs: AtomicU64,
    failures: AtomicU64,
    skips: AtomicU64,
    micros: AtomicU64,
}

#[derive(Debug, Default)]
struct OutcomeCounters {
    done: AtomicU64,
    degraded: AtomicU64,
    rejected: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

/// Process-wide counters, shared by every request.
#[derive(Debug, Default)]
pub struct Metrics {
    stages: DashMap<String, StageCounters>,
    outcomes: OutcomeCounters,
    requests: AtomicU64,
}

/// Counters for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSnapshot {
    pub runs: u64,
    pub failures: u64,
    pub skips: u64,
    pub total_micros: u64,
}

/// Serializable view of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub done: u64,
    pub degraded: u64,
    pub rejected: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub stages: BTreeMap<String, StageSnapshot>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one inbound request.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one stage execution and its wall time.
    pub fn record_run(&self, stage: &str, elapsed: Duration, ok: bool) {
        let counters = self.stages.entry(stage.to_string()).or_default();
        counters.runs.fetch_add(1, Ordering::Relaxed);
        counters
            .micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if !ok {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count an optional stage that did not run.
    pub fn record_skip(&self, stage: &str) {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .skips
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Count a terminal chain state. Non-terminal states are ignored.
    pub fn record_outcome(&self, state: &ChainState) {
        let counter = match state {
            ChainState::Done => &self.outcomes.done,
            ChainState::Degraded { .. } => &self.outcomes.degraded,
            ChainState::Rejected(_) => &self.outcomes.rejected,
            ChainState::Cancelled => &self.outcomes.cancelled,
            ChainState::Failed { .. } => &self.outcomes.failed,
            ChainState::Init | ChainState::Running { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter at once. Counters keep moving while this runs.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages = self
            .stages
            .iter()
            .map(|entry| {
                let c = entry.value();
                (
                    entry.key().clone(),
                    StageSnapshot {
                        runs: c.runs.load(Ordering::Relaxed),
                        failures: c.failures.load(Ordering::Relaxed),
                        skips: c.skips.load(Ordering::Relaxed),
                        total_micros: c.micros.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            done: self.outcomes.done.load(Ordering::Relaxed),
            degraded: self.outcomes.degraded.load(Ordering::Relaxed),
            rejected: self.outcomes.rejected.load(Ordering::Relaxed),
            cancelled: self.outcomes.cancelled.load(Ordering::Relaxed),
            failed: self.outcomes.failed.load(Ordering::Relaxed),
            stages,
        }
    }
}
