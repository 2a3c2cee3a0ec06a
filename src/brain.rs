//! The request facade.
//!
//! [`Brain`] owns the long-lived pieces (stage registry, per-user mental
//! models, metrics) and turns each [`ProcessRequest`] into a fresh
//! [`RequestContext`], runs the chain over it, and shapes the result.
//! [`Brain::process`] never fails: the worst case is a templated apology.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::plan::{Strategy, StrategyTable};
use crate::chain::stages::responder::APOLOGY;
use crate::chain::stages::{
    ConductorStage, ContextGatherStage, DynamicContextStage, EmotionStage, JudgeStage,
    MentalSimulationStage, MentalStateStage, ResponderStage, ToneAdvice, ToneStage,
    ToolPolicyStage,
};
use crate::chain::tools::{
    AcceptanceStatsTool, ConversationRecallTool, EditHistoryTool, Tool, ToolGateway, ToolRegistry,
};
use crate::chain::{
    CancelToken, ChainExecutor, ChainRun, ChainState, PolicyRejection, Stage, StageId,
    StageRegistry,
};
use crate::config::BrainConfig;
use crate::context::keys::{
    AGENT_PLAN, DRAFT, EMOTIONAL_CONTEXT, FINAL_TEXT, HISTORY, REFINEMENT_REPORT,
    SIMULATION_RECORD, TONE_ADVICE,
};
use crate::context::{RequestContext, RequestInfo};
use crate::emotion::{EmotionalAnalyzer, EmotionalState, EmotionalToneAdjuster, Lexicon, ToneTable};
use crate::error::Result;
use crate::llm::{with_timeout, EchoCompletion, TextCompletion};
use crate::mental::{MentalSimulator, MentalStateInferencer, ResponseScenario, UserMentalModel};
use crate::metrics::Metrics;
use crate::provider::{ConversationDataProvider, InMemoryDataProvider};
use crate::trace::{TraceSink, TracingSink};

/// Turns of conversation history preloaded per request.
const HISTORY_LIMIT: usize = 20;

/// One inbound user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub message: String,
    /// Generated when absent.
    #[serde(default)]
    pub trace_id: Option<String>,
}

impl ProcessRequest {
    /// A request without a trace id; one is generated on processing.
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            message: message.into(),
            trace_id: None,
        }
    }

    /// Use a caller-supplied trace id instead of generating one.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Why the answer looks the way it does.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explainability {
    pub outcome: ChainState,
    pub strategy: Option<Strategy>,
    pub emotional_state: Option<EmotionalState>,
    pub selected_scenario: Option<ResponseScenario>,
    pub predicted_reaction: Option<String>,
    pub tone_advice: Option<ToneAdvice>,
    pub degraded: bool,
    pub rejection: Option<PolicyRejection>,
    pub refinement_iterations: u32,
    pub executed_stages: Vec<StageId>,
    /// Phase boundary markers, in order.
    pub stage_trace: Vec<String>,
}

/// The answer plus what produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub text: String,
    pub trace_id: String,
    pub explain: Explainability,
}

/// The long-lived facade: one per process, shared across requests.
pub struct Brain {
    executor: ChainExecutor,
    provider: Arc<dyn ConversationDataProvider>,
    inferencer: Arc<MentalStateInferencer>,
    metrics: Arc<Metrics>,
    config: BrainConfig,
}

impl Brain {
    /// Start a [`BrainBuilder`] with default collaborators.
    pub fn builder() -> BrainBuilder {
        BrainBuilder::default()
    }

    /// Validated configuration this brain was built with.
    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    /// Shared request and stage counters.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// The per-user mental-model store.
    pub fn inferencer(&self) -> &Arc<MentalStateInferencer> {
        &self.inferencer
    }

    /// Registered stage ids in execution order.
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.executor.registry().ids()
    }

    /// The user's current model, if one has been built.
    pub fn mental_model(&self, user_id: &str) -> Option<UserMentalModel> {
        self.inferencer.peek(user_id)
    }

    /// Drop idle mental models. See `inferencer.idle_ttl_secs`.
    pub fn evict_idle(&self) -> usize {
        self.inferencer.evict_idle()
    }

    /// Run one request through the chain. Never fails; see the module docs.
    pub async fn process(&self, request: ProcessRequest) -> ProcessResponse {
        self.process_with_cancel(request, &CancelToken::new()).await
    }

    /// Like [`process`](Self::process), stopping early once `cancel` fires.
    pub async fn process_with_cancel(
        &self,
        request: ProcessRequest,
        cancel: &CancelToken,
    ) -> ProcessResponse {
        self.metrics.record_request();
        let trace_id = request
            .trace_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut ctx = RequestContext::new(RequestInfo::new(
            request.user_id,
            request.conversation_id,
            request.message,
            trace_id,
        ));
        self.preload_history(&mut ctx).await;

        let run = self.executor.run(&mut ctx, cancel).await;
        respond(&ctx, run)
    }

    async fn preload_history(&self, ctx: &mut RequestContext) {
        let conversation_id = ctx.request().conversation_id.clone();
        let loaded = with_timeout(
            "conversation_history",
            self.config.timeouts.provider(),
            self.provider
                .conversation_history(&conversation_id, HISTORY_LIMIT),
        )
        .await;

        match loaded {
            Ok(history) => {
                if let Err(e) = ctx.put(HISTORY, history) {
                    log::warn!("[{}] Brain: could not store history: {}", ctx.trace_id(), e);
                }
            }
            Err(e) => {
                log::warn!(
                    "[{}] Brain: history unavailable for '{}': {}",
                    ctx.trace_id(),
                    conversation_id,
                    e
                );
            }
        }
    }
}

impl std::fmt::Debug for Brain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brain")
            .field("stages", self.executor.registry())
            .field("users", &self.inferencer.len())
            .finish()
    }
}

fn respond(ctx: &RequestContext, run: ChainRun) -> ProcessResponse {
    if let Some(e) = &run.error {
        log::error!("[{}] Brain: chain failed: {}", ctx.trace_id(), e);
    }

    let text = match &run.state {
        ChainState::Rejected(rejection) => format!(
            "I can't complete this request: it needs the '{}' tool, which isn't permitted here ({}).",
            rejection.tool, rejection.reason
        ),
        _ => ctx
            .try_get(FINAL_TEXT)
            .cloned()
            .or_else(|| ctx.try_get(DRAFT).map(|d| d.text.clone()))
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| APOLOGY.to_string()),
    };

    let simulation = ctx.try_get(SIMULATION_RECORD);
    let explain = Explainability {
        strategy: ctx.try_get(AGENT_PLAN).map(|p| p.strategy),
        emotional_state: ctx.try_get(EMOTIONAL_CONTEXT).map(|e| e.current_state()),
        selected_scenario: simulation.map(|s| s.scenario.clone()),
        predicted_reaction: simulation.map(|s| s.predicted_reaction.clone()),
        tone_advice: ctx.try_get(TONE_ADVICE).copied(),
        degraded: matches!(run.state, ChainState::Degraded { .. }),
        rejection: match &run.state {
            ChainState::Rejected(r) => Some(r.clone()),
            _ => None,
        },
        refinement_iterations: ctx
            .try_get(REFINEMENT_REPORT)
            .map(|r| r.iterations)
            .unwrap_or(0),
        executed_stages: run.executed,
        stage_trace: ctx
            .trace()
            .iter()
            .filter(|entry| entry.starts_with(">>") || entry.starts_with("<<"))
            .cloned()
            .collect(),
        outcome: run.state,
    };

    ProcessResponse {
        text,
        trace_id: ctx.trace_id().to_string(),
        explain,
    }
}

/// Assembles a [`Brain`] with the built-in stages and tools.
///
/// Anything not set falls back to an offline default: [`EchoCompletion`],
/// an empty [`InMemoryDataProvider`], and [`TracingSink`].
#[derive(Default)]
pub struct BrainBuilder {
    config: BrainConfig,
    completion: Option<Arc<dyn TextCompletion>>,
    provider: Option<Arc<dyn ConversationDataProvider>>,
    sink: Option<Arc<dyn TraceSink>>,
    lexicon: Option<Lexicon>,
    tone_table: Option<ToneTable>,
    strategy_table: Option<StrategyTable>,
    tools: Vec<Arc<dyn Tool>>,
    stages: Vec<Arc<dyn Stage>>,
}

impl BrainBuilder {
    /// Replace the whole configuration. Validated in [`build`](Self::build).
    pub fn config(mut self, config: BrainConfig) -> Self {
        self.config = config;
        self
    }

    /// Completion backend for the responder and judge. Defaults to [`EchoCompletion`].
    pub fn completion(mut self, completion: Arc<dyn TextCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Read-only conversation data. Defaults to an empty [`InMemoryDataProvider`].
    pub fn provider(mut self, provider: Arc<dyn ConversationDataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Where stage-boundary events go. Defaults to [`TracingSink`].
    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Trigger table for the emotional analyzer.
    pub fn lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    /// Prefix/suffix rules for the tone adjuster.
    pub fn tone_table(mut self, table: ToneTable) -> Self {
        self.tone_table = Some(table);
        self
    }

    /// Strategy to stages-and-tools mapping used by the conductor.
    pub fn strategy_table(mut self, table: StrategyTable) -> Self {
        self.strategy_table = Some(table);
        self
    }

    /// Register an extra tool next to the built-in ones.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register an extra stage. A stage reusing a built-in id replaces it.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate the config and wire every stage into the registry.
    pub fn build(self) -> Result<Brain> {
        let config = self.config;
        config.validate()?;

        let lexicon = self.lexicon.unwrap_or_else(Lexicon::builtin);
        let analyzer = Arc::new(EmotionalAnalyzer::new(&lexicon, config.analyzer.saturation));
        let inferencer = Arc::new(MentalStateInferencer::new(
            Arc::clone(&analyzer),
            config.inferencer.clone(),
        ));
        let simulator = Arc::new(MentalSimulator::new(Arc::clone(&analyzer), &config.simulator));
        let tone = Arc::new(EmotionalToneAdjuster::new(
            self.tone_table.unwrap_or_else(ToneTable::builtin),
        ));
        let completion = self
            .completion
            .unwrap_or_else(|| Arc::new(EchoCompletion));
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(InMemoryDataProvider::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let metrics = Arc::new(Metrics::new());

        let mut tools = ToolRegistry::new()
            .with(Arc::new(EditHistoryTool::new(Arc::clone(&provider))))
            .with(Arc::new(AcceptanceStatsTool::new(Arc::clone(&provider))))
            .with(Arc::new(ConversationRecallTool::new(Arc::clone(&provider))));
        for tool in self.tools {
            tools.register(tool);
        }
        let tools = Arc::new(tools);
        let timeouts = &config.timeouts;

        let mut registry = StageRegistry::new()
            .with(Arc::new(EmotionStage::new(Arc::clone(&analyzer))))
            .with(Arc::new(MentalStateStage::new(Arc::clone(&inferencer))))
            .with(Arc::new(ConductorStage::new(
                self.strategy_table.unwrap_or_else(StrategyTable::builtin),
                config.policy.denied_tools.iter().cloned(),
                tools.names().map(str::to_string),
            )))
            .with(Arc::new(ToolPolicyStage::new(config.policy.enforcement)))
            .with(Arc::new(ContextGatherStage::new(ToolGateway::new(
                Arc::clone(&tools),
                timeouts.tool(),
            ))))
            .with(Arc::new(ResponderStage::new(
                Arc::clone(&completion),
                Arc::clone(&tone),
                timeouts.completion(),
            )))
            .with(Arc::new(JudgeStage::new(
                completion,
                config.judge.clone(),
                timeouts.completion(),
            )))
            .with(Arc::new(ToneStage::new(tone)))
            .with(Arc::new(MentalSimulationStage::new(simulator)));
        for stage in self.stages {
            registry.register(stage);
        }

        // Dynamic context validates plans against the final stage set, itself included.
        let mut known = registry.ids();
        known.push(StageId::DYNAMIC_CONTEXT);
        registry.register(Arc::new(DynamicContextStage::new(known, tools)));

        log::info!("Brain: built with {:?}", registry);
        let executor = ChainExecutor::new(Arc::new(registry), sink, Arc::clone(&metrics));

        Ok(Brain {
            executor,
            provider,
            inferencer,
            metrics,
            config,
        })
    }
}
