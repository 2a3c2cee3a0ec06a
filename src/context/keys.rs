//! Well-known context keys written by the built-in stages.
//!
//! | key | writer |
//! |---|---|
//! | `history` | request host (preload) |
//! | `emotionalContext`, `emotionalReading` | emotion stage |
//! | `mentalModel` | mental-state stage |
//! | `agentPlan` (frozen) | conductor |
//! | `activeStages`, `resolvedTools` | dynamic context |
//! | `toolGuard` | tool policy |
//! | `toolFindings` | context gather |
//! | `draft` | responder, judge |
//! | `refinementReport` | judge |
//! | `finalText`, `toneAdvice` | tone, simulation |
//! | `simulationRecord` | simulation |

use super::ContextKey;
use crate::chain::plan::{ActiveStages, AgentPlan, Draft, ResolvedTools};
use crate::chain::stages::judge::RefinementReport;
use crate::chain::stages::simulation::SimulationRecord;
use crate::chain::stages::tone::ToneAdvice;
use crate::chain::tools::{ToolFindings, ToolGuard};
use crate::emotion::{EmotionalContext, EmotionalReading};
use crate::mental::UserMentalModel;
use crate::provider::ConversationHistory;

/// Preloaded by the facade before any stage runs.
pub const HISTORY: ContextKey<ConversationHistory> = ContextKey::new("history");
/// Written frozen by the emotion stage.
pub const EMOTIONAL_CONTEXT: ContextKey<EmotionalContext> = ContextKey::new("emotionalContext");
pub const EMOTIONAL_READING: ContextKey<EmotionalReading> = ContextKey::new("emotionalReading");
pub const MENTAL_MODEL: ContextKey<UserMentalModel> = ContextKey::new("mentalModel");
/// Written frozen by the conductor.
pub const AGENT_PLAN: ContextKey<AgentPlan> = ContextKey::new("agentPlan");
pub const ACTIVE_STAGES: ContextKey<ActiveStages> = ContextKey::new("activeStages");
/// Allow-listed tools present in the registry.
pub const RESOLVED_TOOLS: ContextKey<ResolvedTools> = ContextKey::new("resolvedTools");
/// Written frozen by the tool-policy stage.
pub const TOOL_GUARD: ContextKey<ToolGuard> = ContextKey::new("toolGuard");
pub const TOOL_FINDINGS: ContextKey<ToolFindings> = ContextKey::new("toolFindings");
pub const DRAFT: ContextKey<Draft> = ContextKey::new("draft");
pub const REFINEMENT_REPORT: ContextKey<RefinementReport> = ContextKey::new("refinementReport");
/// User-facing text after tone and simulation.
pub const FINAL_TEXT: ContextKey<String> = ContextKey::new("finalText");
pub const TONE_ADVICE: ContextKey<ToneAdvice> = ContextKey::new("toneAdvice");
pub const SIMULATION_RECORD: ContextKey<SimulationRecord> = ContextKey::new("simulationRecord");
