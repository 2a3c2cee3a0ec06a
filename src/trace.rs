//! Stage-boundary trace events and the sinks that receive them.
//!
//! A [`TraceSink`] is fire-and-forget: `emit` is synchronous, never blocks
//! and never fails. Sinks that can fill up drop events and count the drops.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// What happened at a stage boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    Started,
    Finished { outcome: String },
    Skipped,
    Failed { message: String },
    Cancelled,
    /// Emitted once per request after the last stage.
    ChainFinished { state: String },
}

/// One stage-boundary event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub trace_id: String,
    pub stage: String,
    pub order: i32,
    #[serde(flatten)]
    pub kind: TraceEventKind,
    pub elapsed_ms: u64,
    pub at: DateTime<Utc>,
}

impl TraceEvent {
    /// Event stamped with the current time.
    pub fn new(
        trace_id: impl Into<String>,
        stage: impl Into<String>,
        order: i32,
        kind: TraceEventKind,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            stage: stage.into(),
            order,
            kind,
            elapsed_ms,
            at: Utc::now(),
        }
    }
}

/// Receives stage-boundary events. `emit` must not block or fail.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: TraceEvent);
}

/// Structured `tracing` events keyed by `trace_id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&self, event: TraceEvent) {
        match &event.kind {
            TraceEventKind::Failed { message } => tracing::warn!(
                trace_id = %event.trace_id,
                stage = %event.stage,
                order = event.order,
                elapsed_ms = event.elapsed_ms,
                error = %message,
                "stage failed"
            ),
            TraceEventKind::Finished { outcome } => tracing::debug!(
                trace_id = %event.trace_id,
                stage = %event.stage,
                order = event.order,
                elapsed_ms = event.elapsed_ms,
                outcome = %outcome,
                "stage finished"
            ),
            TraceEventKind::ChainFinished { state } => tracing::info!(
                trace_id = %event.trace_id,
                elapsed_ms = event.elapsed_ms,
                state = %state,
                "chain finished"
            ),
            other => tracing::trace!(
                trace_id = %event.trace_id,
                stage = %event.stage,
                order = event.order,
                event = ?other,
                "stage boundary"
            ),
        }
    }
}

/// Forwards events over a bounded channel; drops them when the channel is full.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<TraceEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Sink plus the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TraceEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Events dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TraceSink for ChannelSink {
    fn emit(&self, event: TraceEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _event: TraceEvent) {}
}
