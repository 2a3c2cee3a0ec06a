//! Agent plan and the per-request values derived from it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::stage::StageId;

/// How the chain should approach a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Lead with the fix, skip the background.
    QuickFix,
    /// Dig into what went wrong, using the user's recent history.
    Troubleshoot,
    /// Teach the concept with examples.
    Explain,
    /// Peer-level answer with alternatives.
    Advanced,
    Direct,
}

impl Strategy {
    /// Stable snake_case name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::QuickFix => "quick_fix",
            Strategy::Troubleshoot => "troubleshoot",
            Strategy::Explain => "explain",
            Strategy::Advanced => "advanced",
            Strategy::Direct => "direct",
        }
    }

    /// One-line instruction for the completion prompt.
    pub fn instruction(self) -> &'static str {
        match self {
            Strategy::QuickFix => "Give the fix first in as few steps as possible.",
            Strategy::Troubleshoot => {
                "Diagnose the likely cause, then give numbered steps to resolve it."
            }
            Strategy::Explain => "Explain the concept plainly, with a short example.",
            Strategy::Advanced => {
                "Answer at an expert level and mention alternative approaches."
            }
            Strategy::Direct => "Answer directly and concisely.",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool a strategy wants, with explicit fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolNeed {
    pub tool: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// When true and every candidate is rejected, the request is rejected.
    #[serde(default)]
    pub required: bool,
}

impl ToolNeed {
    /// Best-effort tool with no fallbacks.
    pub fn optional(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            fallbacks: Vec::new(),
            required: false,
        }
    }

    /// Tool whose rejection rejects the request unless a fallback is allowed.
    pub fn required(tool: &str, fallbacks: &[&str]) -> Self {
        Self {
            tool: tool.to_string(),
            fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
            required: true,
        }
    }

    /// Primary tool first, then fallbacks.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.tool.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }
}

/// Optional stages and tools a strategy asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    #[serde(default)]
    pub stages: Vec<StageId>,
    #[serde(default)]
    pub tools: Vec<ToolNeed>,
}

/// Strategy → profile rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTable {
    pub profiles: BTreeMap<Strategy, StrategyProfile>,
}

impl StrategyTable {
    /// The default table: one row per [`Strategy`].
    pub fn builtin() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            Strategy::QuickFix,
            StrategyProfile {
                stages: vec![StageId::CONTEXT_GATHER],
                tools: vec![ToolNeed::optional("edit_history")],
            },
        );
        profiles.insert(
            Strategy::Troubleshoot,
            StrategyProfile {
                stages: vec![StageId::CONTEXT_GATHER, StageId::MENTAL_SIMULATION],
                tools: vec![
                    ToolNeed::required("edit_history", &["conversation_recall"]),
                    ToolNeed::optional("acceptance_stats"),
                ],
            },
        );
        profiles.insert(
            Strategy::Explain,
            StrategyProfile {
                stages: vec![StageId::CONTEXT_GATHER, StageId::MENTAL_SIMULATION],
                tools: vec![ToolNeed::optional("conversation_recall")],
            },
        );
        profiles.insert(
            Strategy::Advanced,
            StrategyProfile {
                stages: vec![StageId::CONTEXT_GATHER],
                tools: vec![
                    ToolNeed::optional("edit_history"),
                    ToolNeed::optional("acceptance_stats"),
                ],
            },
        );
        profiles.insert(Strategy::Direct, StrategyProfile::default());
        Self { profiles }
    }

    /// Profile for `strategy`; an unlisted strategy gets an empty profile.
    pub fn profile(&self, strategy: Strategy) -> StrategyProfile {
        self.profiles.get(&strategy).cloned().unwrap_or_default()
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The plan for one request. Written once by the conductor, then frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPlan {
    pub strategy: Strategy,
    /// Optional stages to enable, ordered and deduplicated.
    pub selected_stages: Vec<StageId>,
    pub tool_allow_list: BTreeSet<String>,
    /// Tools to request, with their fallbacks.
    pub tool_needs: Vec<ToolNeed>,
    /// Short human-readable reason for the strategy choice.
    pub rationale: String,
}

impl AgentPlan {
    /// Whether `tool` is on the plan's allow-list.
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tool_allow_list.contains(tool)
    }

    /// Whether the plan picked the optional `stage`.
    pub fn selects(&self, stage: &StageId) -> bool {
        self.selected_stages.contains(stage)
    }
}

/// Optional stages materialized for this request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActiveStages(Vec<StageId>);

impl ActiveStages {
    /// Deduplicates, keeping first occurrences in order.
    pub fn new(stages: Vec<StageId>) -> Self {
        let mut seen = BTreeSet::new();
        Self(stages.into_iter().filter(|s| seen.insert(s.clone())).collect())
    }

    /// Whether `stage` runs for this request.
    pub fn contains(&self, stage: &StageId) -> bool {
        self.0.contains(stage)
    }

    pub fn as_slice(&self) -> &[StageId] {
        &self.0
    }
}

/// Allowed tools that actually have an implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedTools(pub Vec<String>);

impl ResolvedTools {
    /// Whether `tool` survived resolution.
    pub fn contains(&self, tool: &str) -> bool {
        self.0.iter().any(|t| t == tool)
    }
}

/// Where a draft's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftSource {
    Completion,
    Refined,
    /// Templated text used when the completion capability was unavailable.
    Fallback,
}

/// The in-flight answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub text: String,
    pub source: DraftSource,
    pub revision: u32,
}

impl Draft {
    /// First revision of a draft.
    pub fn new(text: impl Into<String>, source: DraftSource) -> Self {
        Self {
            text: text.into(),
            source,
            revision: 0,
        }
    }

    /// Next revision with `text`, marked [`DraftSource::Refined`].
    pub fn refined(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: DraftSource::Refined,
            revision: self.revision + 1,
        }
    }
}
