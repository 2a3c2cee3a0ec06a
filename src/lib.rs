//! # brainchain
//!
//! A conversational backend for developer questions. Each request runs
//! through an ordered chain of stages ("brains") over one typed
//! [`RequestContext`](context::RequestContext): emotional detection,
//! per-user mental-state inference, planning, tool policy, drafting,
//! judge/refine, tone adjustment, and multi-scenario response simulation.
//!
//! ```no_run
//! use brainchain::{Brain, ProcessRequest};
//!
//! # async fn run() -> brainchain::Result<()> {
//! let brain = Brain::builder().build()?;
//! let out = brain
//!     .process(ProcessRequest::new("user-1", "conv-1", "I'm stuck, the build is not working"))
//!     .await;
//! println!("{}\n{:?}", out.text, out.explain.strategy);
//! # Ok(())
//! # }
//! ```

pub mod brain;
pub mod chain;
pub mod config;
pub mod context;
pub mod emotion;
pub mod error;
pub mod heuristics;
pub mod llm;
pub mod mental;
pub mod metrics;
pub mod provider;
pub mod server;
pub mod trace;

#[cfg(test)]
mod testing;

pub use brain::{Brain, BrainBuilder, Explainability, ProcessRequest, ProcessResponse};
pub use chain::{CancelToken, ChainState, PolicyRejection, Stage, StageId, StageOutcome};
pub use config::BrainConfig;
pub use emotion::{EmotionalAnalyzer, EmotionalContext, EmotionalState, EmotionalToneAdjuster};
pub use error::{BrainError, Result};
pub use mental::{MentalSimulator, MentalStateInferencer, ResponseScenario, UserMentalModel};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
