//! Emotion-aware wrapping of a draft response.
//!
//! The adjuster only adds framing around the draft; every paragraph of the
//! draft survives, in order. Which framing applies to which state lives in a
//! [`ToneTable`], not in branches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::state::{EmotionalContext, EmotionalState};

/// How one emotional state shapes a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneRule {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    /// Lead with the first paragraph and push the rest under a details marker.
    pub lead_with_fix: bool,
    pub include_examples: bool,
    pub include_step_by_step: bool,
}

/// State → [`ToneRule`]. States without an entry pass through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneTable {
    pub rules: BTreeMap<EmotionalState, ToneRule>,
}

impl ToneTable {
    /// The default table.
    pub fn builtin() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            EmotionalState::Frustrated,
            ToneRule {
                prefix: Some(
                    "I understand this is frustrating. Let's work through it one step at a time."
                        .into(),
                ),
                suffix: Some(
                    "You've got this. If one of the steps doesn't behave as described, tell me which one and we'll dig in."
                        .into(),
                ),
                include_step_by_step: true,
                ..Default::default()
            },
        );
        rules.insert(
            EmotionalState::Confused,
            ToneRule {
                prefix: Some(
                    "This is a common question, so you're in good company. Here's how it fits together."
                        .into(),
                ),
                suffix: Some(
                    "A good next step: try the smallest example on your own code and tell me what you see."
                        .into(),
                ),
                include_examples: true,
                include_step_by_step: true,
                ..Default::default()
            },
        );
        let rushed = ToneRule {
            prefix: Some("Quick answer:".into()),
            lead_with_fix: true,
            ..Default::default()
        };
        rules.insert(EmotionalState::Rushed, rushed.clone());
        rules.insert(EmotionalState::Urgent, rushed);
        rules.insert(
            EmotionalState::Confident,
            ToneRule {
                suffix: Some(
                    "If you want to go further, there are alternative approaches worth weighing here. Happy to compare their trade-offs."
                        .into(),
                ),
                ..Default::default()
            },
        );
        rules.insert(
            EmotionalState::Curious,
            ToneRule {
                prefix: Some("Good question. A bit of background first helps.".into()),
                suffix: Some(
                    "There's more to explore behind this design if you're interested, and I can go deeper on any part."
                        .into(),
                ),
                include_examples: true,
                ..Default::default()
            },
        );
        rules.insert(
            EmotionalState::Negative,
            ToneRule {
                prefix: Some("Sorry this has been a rough one. Let's get it sorted.".into()),
                include_step_by_step: true,
                ..Default::default()
            },
        );
        rules.insert(
            EmotionalState::Positive,
            ToneRule {
                suffix: Some("Glad it's coming together!".into()),
                ..Default::default()
            },
        );
        Self { rules }
    }

    /// The rule for `state`, if any.
    pub fn rule(&self, state: EmotionalState) -> Option<&ToneRule> {
        self.rules.get(&state)
    }
}

impl Default for ToneTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Applies a [`ToneTable`] to drafts.
#[derive(Debug, Clone, Default)]
pub struct EmotionalToneAdjuster {
    table: ToneTable,
}

impl EmotionalToneAdjuster {
    /// Adjuster over a custom table.
    pub fn new(table: ToneTable) -> Self {
        Self { table }
    }

    /// Frame `base_response` for the user's state. Every paragraph is kept in order.
    pub fn adjust_tone(&self, base_response: &str, context: &EmotionalContext) -> String {
        let Some(rule) = self.table.rule(context.current_state()) else {
            return base_response.to_string();
        };
        if base_response.trim().is_empty() {
            return base_response.to_string();
        }

        let body = if rule.lead_with_fix {
            lead_with_fix(base_response)
        } else {
            base_response.to_string()
        };

        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(prefix) = rule.prefix.as_deref() {
            parts.push(prefix);
        }
        parts.push(&body);
        if let Some(suffix) = rule.suffix.as_deref() {
            parts.push(suffix);
        }
        parts.join("\n\n")
    }

    /// Whether examples would help this user.
    pub fn should_include_examples(&self, context: &EmotionalContext) -> bool {
        self.table
            .rule(context.current_state())
            .is_some_and(|r| r.include_examples)
    }

    /// Whether the answer should be broken into steps.
    pub fn should_include_step_by_step(&self, context: &EmotionalContext) -> bool {
        self.table
            .rule(context.current_state())
            .is_some_and(|r| r.include_step_by_step)
    }
}

/// First paragraph up front, the remainder deferred under "Details:".
fn lead_with_fix(base: &str) -> String {
    let trimmed = base.trim();
    match trimmed.split_once("\n\n") {
        Some((fix, rest)) if !rest.trim().is_empty() => {
            format!("{}\n\nDetails:\n{}", fix.trim(), rest.trim())
        }
        _ => trimmed.to_string(),
    }
}
