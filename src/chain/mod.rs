//! # Brain chain
//!
//! A request flows through an ordered list of [`Stage`]s held in a
//! [`StageRegistry`]. The [`ChainExecutor`] runs them one after another over
//! the same [`RequestContext`](crate::context::RequestContext), each inside a
//! [`Phase`](crate::context::Phase):
//!
//! ```text
//! emotion(-20) → mental_state(-10) → conductor(0) → dynamic_context(10)
//!   → tool_policy(20) → [context_gather(25)] → responder(30) → judge(40)
//!   → tone(50) → [mental_simulation(60)]
//! ```
//!
//! Bracketed stages are optional and only run when the conductor's plan
//! selects them.

pub mod executor;
pub mod plan;
pub mod registry;
pub mod stage;
pub mod stages;
pub mod tools;

pub use executor::{CancelToken, ChainExecutor, ChainRun, ChainState};
pub use plan::{AgentPlan, Draft, DraftSource, Strategy, StrategyTable, ToolNeed};
pub use registry::StageRegistry;
pub use stage::{PolicyRejection, Stage, StageId, StageOutcome};
