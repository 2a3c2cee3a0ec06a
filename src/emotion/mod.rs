//! # Emotional detection and tone
//!
//! ```text
//! message ──► EmotionalAnalyzer ──► EmotionalContext ──► EmotionalToneAdjuster ──► final text
//!                   │                       │
//!                Lexicon                 ToneTable
//! ```
//!
//! Both rule tables are plain data with built-in defaults.

pub mod analyzer;
pub mod lexicon;
pub mod state;
pub mod tone;

pub use analyzer::{EmotionalAnalyzer, EmotionalReading, StateScores};
pub use lexicon::Lexicon;
pub use state::{EmotionalContext, EmotionalState};
pub use tone::{EmotionalToneAdjuster, ToneRule, ToneTable};
