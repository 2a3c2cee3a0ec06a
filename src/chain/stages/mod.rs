//! Built-in stages, in chain order.

pub mod conductor;
pub mod context_gather;
pub mod dynamic_context;
pub mod emotion;
pub mod judge;
pub mod responder;
pub mod simulation;
pub mod tone;
pub mod tool_policy;

pub use conductor::ConductorStage;
pub use context_gather::ContextGatherStage;
pub use dynamic_context::DynamicContextStage;
pub use emotion::{EmotionStage, MentalStateStage};
pub use judge::{JudgeStage, QualityCheck, RefinementReport, Verdict};
pub use responder::ResponderStage;
pub use simulation::{MentalSimulationStage, SimulationRecord};
pub use tone::{ToneAdvice, ToneStage};
pub use tool_policy::ToolPolicyStage;
