//! The `Stage` capability interface and its outcomes.

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::Result;

/// Stable identifier of a stage ("brain").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(Cow<'static, str>);

impl StageId {
    pub const EMOTION: StageId = StageId::from_static("emotion");
    pub const MENTAL_STATE: StageId = StageId::from_static("mental_state");
    pub const CONDUCTOR: StageId = StageId::from_static("conductor");
    pub const DYNAMIC_CONTEXT: StageId = StageId::from_static("dynamic_context");
    pub const TOOL_POLICY: StageId = StageId::from_static("tool_policy");
    pub const CONTEXT_GATHER: StageId = StageId::from_static("context_gather");
    pub const RESPONDER: StageId = StageId::from_static("responder");
    pub const JUDGE: StageId = StageId::from_static("judge");
    pub const TONE: StageId = StageId::from_static("tone");
    pub const MENTAL_SIMULATION: StageId = StageId::from_static("mental_simulation");

    /// Id for a built-in stage name.
    pub const fn from_static(id: &'static str) -> Self {
        StageId(Cow::Borrowed(id))
    }

    /// Id for a custom stage.
    pub fn new(id: impl Into<String>) -> Self {
        StageId(Cow::Owned(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An explicit refusal by tool policy. Not an error: callers see it as a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRejection {
    pub tool: String,
    pub reason: String,
    /// Stage that asked for the tool.
    pub stage: String,
}

impl fmt::Display for PolicyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tool '{}' rejected for stage '{}': {}",
            self.tool, self.stage, self.reason
        )
    }
}

/// What a stage tells the executor after it ran.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Continue,
    /// Best-effort result; the chain keeps going but ends `Degraded`.
    Degraded { reason: String },
    /// Hard policy failure with no fallback; the chain stops `Rejected`.
    Rejected(PolicyRejection),
}

impl StageOutcome {
    /// Lower-case name used in trace events.
    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Continue => "continue",
            StageOutcome::Degraded { .. } => "degraded",
            StageOutcome::Rejected(_) => "rejected",
        }
    }
}

/// One unit of the ordered pipeline.
///
/// Stages read what earlier stages wrote and write their own results into
/// the [`RequestContext`]. They run strictly one at a time per request.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Position in the chain; lower runs first.
    fn order(&self) -> i32;

    /// Optional stages only run when the request's active stage set names them.
    fn optional(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<StageOutcome>;
}
