//! Sequential chain executor.
//!
//! Runs the registered stages of one request strictly in ascending order,
//! each inside a [`Phase`], and drives the chain state machine:
//!
//! ```text
//! Init ─► Running(0) ─► … ─► Running(n) ─► Done
//!              │                  │
//!              ├─► Rejected       ├─► Degraded (after the last stage)
//!              ├─► Failed         └─► Cancelled
//! ```
//!
//! A `Degraded` stage outcome is sticky: later stages still run, and the
//! chain ends `Degraded` in place of `Done`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Notify;

use super::registry::StageRegistry;
use super::stage::{PolicyRejection, Stage, StageId, StageOutcome};
use crate::context::keys::ACTIVE_STAGES;
use crate::context::{Phase, RequestContext};
use crate::error::BrainError;
use crate::metrics::Metrics;
use crate::trace::{TraceEvent, TraceEventKind, TraceSink};

/// State of one chain run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainState {
    Init,
    Running { stage: StageId, index: usize },
    Done,
    Degraded { reason: String },
    Rejected(PolicyRejection),
    Cancelled,
    /// A required stage returned an error.
    Failed { stage: StageId, message: String },
}

impl ChainState {
    /// True for every state the chain stops in.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChainState::Init | ChainState::Running { .. })
    }

    /// Lower-case name used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ChainState::Init => "init",
            ChainState::Running { .. } => "running",
            ChainState::Done => "done",
            ChainState::Degraded { .. } => "degraded",
            ChainState::Rejected(_) => "rejected",
            ChainState::Cancelled => "cancelled",
            ChainState::Failed { .. } => "failed",
        }
    }
}

/// Cooperative cancellation shared between a request and whoever may abort it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// A token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Record of one chain run.
#[derive(Debug)]
pub struct ChainRun {
    pub state: ChainState,
    /// Stages that ran, in order.
    pub executed: Vec<StageId>,
    pub skipped: Vec<StageId>,
    /// Errors from optional stages that the chain continued past.
    pub tolerated: Vec<(StageId, BrainError)>,
    /// Set when a required stage failed.
    pub error: Option<BrainError>,
}

/// Runs a [`StageRegistry`] over one request context.
pub struct ChainExecutor {
    registry: Arc<StageRegistry>,
    sink: Arc<dyn TraceSink>,
    metrics: Arc<Metrics>,
}

impl ChainExecutor {
    /// Executor over `registry`, reporting to `sink` and `metrics`.
    pub fn new(registry: Arc<StageRegistry>, sink: Arc<dyn TraceSink>, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            sink,
            metrics,
        }
    }

    /// The stages this executor runs, in order.
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Run every registered stage against `ctx`.
    pub async fn run(&self, ctx: &mut RequestContext, cancel: &CancelToken) -> ChainRun {
        let chain_started = Instant::now();
        let trace_id = ctx.trace_id().to_string();
        let mut state = ChainState::Init;
        let mut degraded: Option<String> = None;
        let mut run = ChainRun {
            state: ChainState::Init,
            executed: Vec::new(),
            skipped: Vec::new(),
            tolerated: Vec::new(),
            error: None,
        };

        log::debug!(
            "[{}] Chain: starting with {} stages",
            trace_id,
            self.registry.len()
        );

        for (index, stage) in self.registry.iter().enumerate() {
            let id = stage.id();
            let order = stage.order();

            if cancel.is_cancelled() {
                self.emit(&trace_id, &id, order, TraceEventKind::Cancelled, 0);
                state = ChainState::Cancelled;
                break;
            }

            if stage.optional() && !is_active(ctx, &id) {
                log::debug!("[{}] Chain: skipping optional stage '{}'", trace_id, id);
                self.metrics.record_skip(id.as_str());
                self.emit(&trace_id, &id, order, TraceEventKind::Skipped, 0);
                run.skipped.push(id);
                continue;
            }

            state = ChainState::Running {
                stage: id.clone(),
                index,
            };
            self.emit(&trace_id, &id, order, TraceEventKind::Started, 0);

            let started = Instant::now();
            let result = {
                let mut phase = Phase::begin(ctx, id.as_str(), order);
                run_stage(stage.as_ref(), phase.ctx(), cancel).await
            };
            let elapsed = started.elapsed();
            let elapsed_ms = elapsed.as_millis() as u64;

            let Some(result) = result else {
                log::info!("[{}] Chain: cancelled during stage '{}'", trace_id, id);
                self.metrics.record_run(id.as_str(), elapsed, false);
                self.emit(&trace_id, &id, order, TraceEventKind::Cancelled, elapsed_ms);
                state = ChainState::Cancelled;
                break;
            };

            self.metrics.record_run(id.as_str(), elapsed, result.is_ok());
            run.executed.push(id.clone());

            match result {
                Ok(outcome) => {
                    self.emit(
                        &trace_id,
                        &id,
                        order,
                        TraceEventKind::Finished {
                            outcome: outcome.label().to_string(),
                        },
                        elapsed_ms,
                    );
                    match outcome {
                        StageOutcome::Continue => {
                            log::debug!("[{}] Chain: stage '{}' completed", trace_id, id);
                        }
                        StageOutcome::Degraded { reason } => {
                            log::warn!("[{}] Chain: stage '{}' degraded: {}", trace_id, id, reason);
                            degraded = Some(reason);
                        }
                        StageOutcome::Rejected(rejection) => {
                            log::warn!("[{}] Chain: rejected: {}", trace_id, rejection);
                            state = ChainState::Rejected(rejection);
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.emit(
                        &trace_id,
                        &id,
                        order,
                        TraceEventKind::Failed {
                            message: e.to_string(),
                        },
                        elapsed_ms,
                    );
                    if stage.optional() {
                        log::warn!(
                            "[{}] Chain: optional stage '{}' failed, continuing: {}",
                            trace_id,
                            id,
                            e
                        );
                        run.tolerated.push((id, e));
                        continue;
                    }
                    log::error!("[{}] Chain: stage '{}' failed: {}", trace_id, id, e);
                    state = ChainState::Failed {
                        stage: id,
                        message: e.to_string(),
                    };
                    run.error = Some(e);
                    break;
                }
            }
        }

        if !state.is_terminal() {
            state = match degraded {
                Some(reason) => ChainState::Degraded { reason },
                None => ChainState::Done,
            };
        }

        self.metrics.record_outcome(&state);
        self.sink.emit(TraceEvent::new(
            trace_id.as_str(),
            "chain",
            i32::MAX,
            TraceEventKind::ChainFinished {
                state: state.label().to_string(),
            },
            chain_started.elapsed().as_millis() as u64,
        ));
        log::debug!("[{}] Chain: finished as {}", trace_id, state.label());

        run.state = state;
        run
    }

    fn emit(&self, trace_id: &str, stage: &StageId, order: i32, kind: TraceEventKind, elapsed_ms: u64) {
        self.sink
            .emit(TraceEvent::new(trace_id, stage.as_str(), order, kind, elapsed_ms));
    }
}

/// `None` when the cancel token fired before the stage finished.
async fn run_stage(
    stage: &dyn Stage,
    ctx: &mut RequestContext,
    cancel: &CancelToken,
) -> Option<crate::error::Result<StageOutcome>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = stage.execute(ctx) => Some(result),
    }
}

fn is_active(ctx: &RequestContext, id: &StageId) -> bool {
    ctx.try_get(ACTIVE_STAGES)
        .map(|active| active.contains(id))
        .unwrap_or(false)
}

impl std::fmt::Debug for ChainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainExecutor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::plan::ActiveStages;
    use crate::context::{ContextKey, RequestInfo};
    use crate::error::Result;
    use crate::trace::{ChannelSink, NullSink};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Keys visible to each stage when it started, with the order of their first writer.
    type Observations = Arc<Mutex<BTreeMap<String, Vec<(String, i32)>>>>;

    /// Writes one key and records everything it can see.
    struct Probe {
        name: &'static str,
        order: i32,
        writes: ContextKey<String>,
        seen: Observations,
    }

    #[async_trait]
    impl Stage for Probe {
        fn id(&self) -> StageId {
            StageId::from_static(self.name)
        }
        fn order(&self) -> i32 {
            self.order
        }
        async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome> {
            let visible: Vec<(String, i32)> = ctx
                .keys()
                .map(|k| (k.to_string(), ctx.meta(k).unwrap().first_writer.order))
                .collect();
            self.seen.lock().insert(self.name.to_string(), visible);
            ctx.put(self.writes, self.name.to_string())?;
            Ok(StageOutcome::Continue)
        }
    }

    struct Fixed {
        name: &'static str,
        order: i32,
        optional: bool,
        outcome: fn() -> Result<StageOutcome>,
    }

    #[async_trait]
    impl Stage for Fixed {
        fn id(&self) -> StageId {
            StageId::from_static(self.name)
        }
        fn order(&self) -> i32 {
            self.order
        }
        fn optional(&self) -> bool {
            self.optional
        }
        async fn execute(&self, _ctx: &mut RequestContext) -> Result<StageOutcome> {
            (self.outcome)()
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Stage for Sleepy {
        fn id(&self) -> StageId {
            StageId::from_static("sleepy")
        }
        fn order(&self) -> i32 {
            5
        }
        async fn execute(&self, _ctx: &mut RequestContext) -> Result<StageOutcome> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(StageOutcome::Continue)
        }
    }

    const A: ContextKey<String> = ContextKey::new("a");
    const B: ContextKey<String> = ContextKey::new("b");
    const C: ContextKey<String> = ContextKey::new("c");
    const D: ContextKey<String> = ContextKey::new("d");

    fn ctx() -> RequestContext {
        RequestContext::new(RequestInfo::new("u", "c", "hello", "trace-x"))
    }

    fn executor(registry: StageRegistry) -> ChainExecutor {
        ChainExecutor::new(Arc::new(registry), Arc::new(NullSink), Arc::new(Metrics::new()))
    }

    fn fixed(name: &'static str, order: i32, outcome: fn() -> Result<StageOutcome>) -> Arc<Fixed> {
        Arc::new(Fixed {
            name,
            order,
            optional: false,
            outcome,
        })
    }

    #[tokio::test]
    async fn test_order_zero_never_sees_later_writes() {
        let seen: Observations = Arc::default();
        // Registered out of order on purpose.
        let probe = |name, order, writes| {
            Arc::new(Probe {
                name,
                order,
                writes,
                seen: Arc::clone(&seen),
            }) as Arc<dyn Stage>
        };
        let registry = StageRegistry::new()
            .with(probe("late", 30, D))
            .with(probe("zero", 0, B))
            .with(probe("after", 10, C))
            .with(probe("early", -10, A));

        let mut ctx = ctx();
        let run = executor(registry).run(&mut ctx, &CancelToken::new()).await;
        assert_eq!(run.state, ChainState::Done);
        assert_eq!(
            run.executed,
            vec![
                StageId::new("early"),
                StageId::new("zero"),
                StageId::new("after"),
                StageId::new("late")
            ]
        );

        let seen = seen.lock();
        let zero = &seen["zero"];
        assert!(zero.iter().all(|(_, order)| *order <= 0), "{zero:?}");
        assert_eq!(zero, &vec![("a".to_string(), -10)]);
        // Later stages see more.
        assert_eq!(seen["late"].len(), 3);
    }

    #[tokio::test]
    async fn test_degraded_is_sticky_but_chain_continues() {
        let registry = StageRegistry::new()
            .with(fixed("judge", 40, || {
                Ok(StageOutcome::Degraded {
                    reason: "budget".into(),
                })
            }))
            .with(fixed("tone", 50, || Ok(StageOutcome::Continue)));
        let run = executor(registry).run(&mut ctx(), &CancelToken::new()).await;
        assert_eq!(
            run.state,
            ChainState::Degraded {
                reason: "budget".into()
            }
        );
        assert_eq!(run.executed.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_stops_chain() {
        let registry = StageRegistry::new()
            .with(fixed("gather", 25, || {
                Ok(StageOutcome::Rejected(PolicyRejection {
                    tool: "shell".into(),
                    reason: "not allowed".into(),
                    stage: "gather".into(),
                }))
            }))
            .with(fixed("responder", 30, || Ok(StageOutcome::Continue)));
        let run = executor(registry).run(&mut ctx(), &CancelToken::new()).await;
        assert!(matches!(run.state, ChainState::Rejected(ref r) if r.tool == "shell"));
        assert_eq!(run.executed, vec![StageId::new("gather")]);
    }

    #[tokio::test]
    async fn test_required_failure_aborts_optional_failure_continues() {
        let failing_optional = Arc::new(Fixed {
            name: "extra",
            order: 5,
            optional: true,
            outcome: || Err(BrainError::Completion("boom".into())),
        });
        let mut ctx = ctx();
        ctx.put(ACTIVE_STAGES, ActiveStages::new(vec![StageId::new("extra")]))
            .unwrap();
        let registry = StageRegistry::new()
            .with(failing_optional)
            .with(fixed("required", 10, || {
                Err(BrainError::StageFailed {
                    stage: "required".into(),
                    message: "bad".into(),
                })
            }))
            .with(fixed("never", 20, || Ok(StageOutcome::Continue)));
        let run = executor(registry).run(&mut ctx, &CancelToken::new()).await;
        assert_eq!(run.tolerated.len(), 1);
        assert!(matches!(run.state, ChainState::Failed { ref stage, .. } if stage.as_str() == "required"));
        assert!(run.error.is_some());
        assert!(!run.executed.contains(&StageId::new("never")));
    }

    #[tokio::test]
    async fn test_optional_stage_skipped_unless_active() {
        let optional = Arc::new(Fixed {
            name: "extra",
            order: 5,
            optional: true,
            outcome: || Ok(StageOutcome::Continue),
        });
        let metrics = Arc::new(Metrics::new());
        let exec = ChainExecutor::new(
            Arc::new(StageRegistry::new().with(optional)),
            Arc::new(NullSink),
            Arc::clone(&metrics),
        );
        let run = exec.run(&mut ctx(), &CancelToken::new()).await;
        assert_eq!(run.skipped, vec![StageId::new("extra")]);
        assert!(run.executed.is_empty());
        assert_eq!(metrics.snapshot().stages["extra"].skips, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let registry = StageRegistry::new().with(fixed("a", 0, || Ok(StageOutcome::Continue)));
        let run = executor(registry).run(&mut ctx(), &cancel).await;
        assert_eq!(run.state, ChainState::Cancelled);
        assert!(run.executed.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_stage() {
        let cancel = CancelToken::new();
        let registry = StageRegistry::new()
            .with(Arc::new(Sleepy))
            .with(fixed("after", 10, || Ok(StageOutcome::Continue)));
        let exec = executor(registry);
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let mut ctx = ctx();
        let run = exec.run(&mut ctx, &cancel).await;
        assert_eq!(run.state, ChainState::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        // The phase still closed cleanly.
        assert!(ctx.trace().last().unwrap().starts_with("<<phase:sleepy:"));
    }

    #[tokio::test]
    async fn test_trace_events_at_boundaries() {
        let (sink, mut rx) = ChannelSink::new(16);
        let exec = ChainExecutor::new(
            Arc::new(StageRegistry::new().with(fixed("only", 0, || Ok(StageOutcome::Continue)))),
            Arc::new(sink),
            Arc::new(Metrics::new()),
        );
        exec.run(&mut ctx(), &CancelToken::new()).await;
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.trace_id, "trace-x");
            kinds.push(event.kind);
        }
        assert_eq!(kinds[0], TraceEventKind::Started);
        assert!(matches!(kinds[1], TraceEventKind::Finished { .. }));
        assert_eq!(
            kinds[2],
            TraceEventKind::ChainFinished {
                state: "done".into()
            }
        );
    }
}
