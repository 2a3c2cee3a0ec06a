//! Trigger-phrase tables for emotional detection.
//!
//! A [`Lexicon`] is plain data (serde-friendly) so deployments and tests can
//! swap in their own phrase sets. [`CompiledLexicon`] turns it into
//! case-insensitive, word-bounded regexes once at construction.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::state::EmotionalState;

/// Trigger phrases per state, plus the exploratory (learning-intent) set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lexicon {
    pub triggers: BTreeMap<EmotionalState, Vec<String>>,
    #[serde(default)]
    pub learning: Vec<String>,
}

impl Lexicon {
    /// The built-in developer-support phrase table.
    pub fn builtin() -> Self {
        let table: [(EmotionalState, &[&str]); 8] = [
            (
                EmotionalState::Frustrated,
                &[
                    "stuck",
                    "not working",
                    "isn't working",
                    "doesn't work",
                    "still broken",
                    "why doesn't",
                    "why won't",
                    "frustrated",
                    "frustrating",
                    "annoying",
                    "fed up",
                    "give up",
                    "nothing works",
                    "keeps failing",
                    "driving me crazy",
                    "ugh",
                ],
            ),
            (
                EmotionalState::Confused,
                &[
                    "confused",
                    "confusing",
                    "don't understand",
                    "doesn't make sense",
                    "makes no sense",
                    "lost",
                    "unclear",
                    "what does this mean",
                    "not sure how",
                    "no idea",
                ],
            ),
            (
                EmotionalState::Rushed,
                &[
                    "urgent",
                    "urgently",
                    "asap",
                    "in a hurry",
                    "hurry",
                    "quickly",
                    "right now",
                    "deadline",
                    "no time",
                    "just tell me",
                ],
            ),
            (
                EmotionalState::Confident,
                &[
                    "i know",
                    "i already know",
                    "i'm familiar with",
                    "i'm comfortable with",
                    "experienced",
                    "obviously",
                    "i've implemented",
                    "i understand",
                ],
            ),
            (
                EmotionalState::Curious,
                &[
                    "explain",
                    "teach me",
                    "how does this work",
                    "how does",
                    "curious",
                    "why does",
                    "what if",
                    "tell me more",
                    "wondering",
                    "interested in",
                ],
            ),
            (
                EmotionalState::Positive,
                &[
                    "thanks",
                    "thank you",
                    "great",
                    "awesome",
                    "perfect",
                    "works now",
                    "appreciate",
                    "nice",
                ],
            ),
            (
                EmotionalState::Negative,
                &["hate", "terrible", "awful", "useless", "broken", "worst", "garbage"],
            ),
            (
                EmotionalState::Urgent,
                &[
                    "outage",
                    "emergency",
                    "critical",
                    "prod is down",
                    "production is down",
                    "blocking",
                    "data loss",
                    "security incident",
                ],
            ),
        ];

        let triggers = table
            .into_iter()
            .map(|(state, phrases)| (state, phrases.iter().map(|p| p.to_string()).collect()))
            .collect();

        let learning = [
            "explain",
            "teach me",
            "step by step",
            "example",
            "examples",
            "how does",
            "how do i",
            "learn",
            "tutorial",
            "walk me through",
            "understand",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect();

        Self { triggers, learning }
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

/// One compiled trigger.
#[derive(Debug, Clone)]
struct Trigger {
    pattern: Regex,
    /// Multi-word phrases weigh more than single keywords.
    weight: f32,
}

impl Trigger {
    fn compile(phrase: &str) -> Option<Self> {
        let phrase = normalize(phrase.trim());
        if phrase.is_empty() {
            return None;
        }
        let starts_word = phrase.chars().next().is_some_and(|c| c.is_alphanumeric());
        let ends_word = phrase.chars().last().is_some_and(|c| c.is_alphanumeric());
        let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
        let pattern = format!(
            "{}{}{}",
            if starts_word { r"\b" } else { "" },
            words.join(r"\s+"),
            if ends_word { r"\b" } else { "" },
        );
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| log::warn!("Skipping trigger '{}': {}", phrase, e))
            .ok()?;
        Some(Self {
            pattern: regex,
            weight: words.len() as f32,
        })
    }

    fn score(&self, text: &str) -> f32 {
        self.pattern.find_iter(text).count() as f32 * self.weight
    }
}

/// A [`Lexicon`] compiled to regexes.
#[derive(Debug, Clone)]
pub struct CompiledLexicon {
    triggers: BTreeMap<EmotionalState, Vec<Trigger>>,
    learning: Vec<Trigger>,
}

impl CompiledLexicon {
    /// Compile every trigger into a word-boundary regex. Invalid triggers are skipped.
    pub fn compile(lexicon: &Lexicon) -> Self {
        let triggers = lexicon
            .triggers
            .iter()
            .map(|(state, phrases)| {
                let compiled = phrases.iter().filter_map(|p| Trigger::compile(p)).collect();
                (*state, compiled)
            })
            .collect();
        let learning = lexicon
            .learning
            .iter()
            .filter_map(|p| Trigger::compile(p))
            .collect();
        Self { triggers, learning }
    }

    /// Weighted match count for every state that has triggers.
    pub fn raw_scores(&self, text: &str) -> BTreeMap<EmotionalState, f32> {
        self.triggers
            .iter()
            .map(|(state, triggers)| (*state, triggers.iter().map(|t| t.score(text)).sum()))
            .collect()
    }

    /// Whether any exploratory trigger matches.
    pub fn has_learning_intent(&self, text: &str) -> bool {
        self.learning.iter().any(|t| t.pattern.is_match(text))
    }
}

/// Fold typographic apostrophes so "isn’t" matches "isn't".
pub fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled() -> CompiledLexicon {
        CompiledLexicon::compile(&Lexicon::builtin())
    }

    #[test]
    fn test_phrase_weight_exceeds_keyword() {
        let lex = compiled();
        let single = lex.raw_scores("I'm stuck");
        let phrase = lex.raw_scores("this is not working");
        assert_eq!(single[&EmotionalState::Frustrated], 1.0);
        assert_eq!(phrase[&EmotionalState::Frustrated], 2.0);
    }

    #[test]
    fn test_case_insensitive_and_word_bounded() {
        let lex = compiled();
        assert_eq!(lex.raw_scores("ASAP please")[&EmotionalState::Rushed], 1.0);
        assert_eq!(lex.raw_scores("open the lostfound folder")[&EmotionalState::Confused], 0.0);
    }

    #[test]
    fn test_curly_apostrophe_normalized() {
        let lex = compiled();
        let text = normalize("this isn\u{2019}t working");
        assert_eq!(lex.raw_scores(&text)[&EmotionalState::Frustrated], 2.0);
    }

    #[test]
    fn test_repeated_matches_count() {
        let lex = compiled();
        assert_eq!(lex.raw_scores("stuck, stuck, stuck")[&EmotionalState::Frustrated], 3.0);
    }

    #[test]
    fn test_learning_intent() {
        let lex = compiled();
        assert!(lex.has_learning_intent("Can you walk me through it?"));
        assert!(!lex.has_learning_intent("ship it"));
    }

    #[test]
    fn test_fixture_lexicon_from_yaml() {
        let yaml = "triggers:\n  FRUSTRATED: [\"borked\"]\nlearning: [\"why\"]\n";
        let lexicon: Lexicon = serde_yaml::from_str(yaml).unwrap();
        let lex = CompiledLexicon::compile(&lexicon);
        assert_eq!(lex.raw_scores("it's borked")[&EmotionalState::Frustrated], 1.0);
        assert!(lex.has_learning_intent("but why"));
    }
}
