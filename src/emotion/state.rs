//! Emotional state types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The primary emotional state detected in one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmotionalState {
    Frustrated,
    Confused,
    Confident,
    Rushed,
    Curious,
    #[default]
    Neutral,
    Positive,
    Negative,
    Urgent,
}

impl EmotionalState {
    /// Every state, in declaration order.
    pub const ALL: [EmotionalState; 9] = [
        EmotionalState::Frustrated,
        EmotionalState::Confused,
        EmotionalState::Confident,
        EmotionalState::Rushed,
        EmotionalState::Curious,
        EmotionalState::Neutral,
        EmotionalState::Positive,
        EmotionalState::Negative,
        EmotionalState::Urgent,
    ];

    /// Tie-break priority, highest first.
    pub const PRIORITY: [EmotionalState; 9] = [
        EmotionalState::Frustrated,
        EmotionalState::Confused,
        EmotionalState::Rushed,
        EmotionalState::Urgent,
        EmotionalState::Negative,
        EmotionalState::Confident,
        EmotionalState::Curious,
        EmotionalState::Positive,
        EmotionalState::Neutral,
    ];

    /// Rank in [`PRIORITY`](Self::PRIORITY); lower wins ties.
    pub fn priority_rank(self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    /// Distress states outrank every other state whenever one of them scores.
    pub fn is_distress(self) -> bool {
        matches!(
            self,
            EmotionalState::Frustrated | EmotionalState::Confused | EmotionalState::Rushed
        )
    }

    /// SCREAMING_SNAKE_CASE name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionalState::Frustrated => "frustrated",
            EmotionalState::Confused => "confused",
            EmotionalState::Confident => "confident",
            EmotionalState::Rushed => "rushed",
            EmotionalState::Curious => "curious",
            EmotionalState::Neutral => "neutral",
            EmotionalState::Positive => "positive",
            EmotionalState::Negative => "negative",
            EmotionalState::Urgent => "urgent",
        }
    }
}

impl fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The emotional signal set for one inbound message.
///
/// Immutable once built; [`EmotionalContext::new`] clamps every level into
/// `[0, 1]` (NaN becomes 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalContext {
    current_state: EmotionalState,
    emotional_intensity: f32,
    frustration_level: f32,
    urgency_level: f32,
    confidence_level: f32,
    learning_intent: bool,
}

impl EmotionalContext {
    /// Clamps every level to `[0, 1]`; NaN becomes 0.
    pub fn new(
        current_state: EmotionalState,
        emotional_intensity: f32,
        frustration_level: f32,
        urgency_level: f32,
        confidence_level: f32,
        learning_intent: bool,
    ) -> Self {
        Self {
            current_state,
            emotional_intensity: clamp_unit(emotional_intensity),
            frustration_level: clamp_unit(frustration_level),
            urgency_level: clamp_unit(urgency_level),
            confidence_level: clamp_unit(confidence_level),
            learning_intent,
        }
    }

    /// Neutral, all levels zero.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// The winning state.
    pub fn current_state(&self) -> EmotionalState {
        self.current_state
    }

    /// Normalized score of the winning state.
    pub fn emotional_intensity(&self) -> f32 {
        self.emotional_intensity
    }

    /// Frustration, with half weight from Negative.
    pub fn frustration_level(&self) -> f32 {
        self.frustration_level
    }

    /// Combined Rushed and Urgent signal.
    pub fn urgency_level(&self) -> f32 {
        self.urgency_level
    }

    /// Confident-state signal.
    pub fn confidence_level(&self) -> f32 {
        self.confidence_level
    }

    /// Whether the message asks to learn or understand.
    pub fn learning_intent(&self) -> bool {
        self.learning_intent
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
