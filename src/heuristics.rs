//! Cheap text measurements shared by the judge checks and the simulator.
//!
//! All scores are in `[0, 1]`, higher is better, and deterministic.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{Alphabetic}\p{N}_':]+").unwrap());
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]").unwrap());

/// Words ignored when comparing a query to a response.
const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "because", "been", "before", "being", "but", "can",
    "could", "does", "doing", "from", "have", "having", "here", "into", "just", "like", "make",
    "more", "need", "please", "really", "should", "some", "than", "that", "their", "them",
    "then", "there", "these", "they", "this", "those", "through", "want", "what", "when",
    "where", "which", "while", "will", "with", "would", "your", "you're", "i'm",
];

/// Terms that read as jargon to a struggling reader.
const JARGON: &[&str] = &[
    "monomorphization",
    "covariance",
    "contravariance",
    "invariant",
    "idempotent",
    "memoization",
    "amortized",
    "vtable",
    "lifetimes",
    "borrowck",
    "heuristic",
    "orthogonal",
    "serialization",
    "asynchronous",
];

/// Sentence length (in words) up to which clarity is perfect.
const COMFORTABLE_SENTENCE_WORDS: f32 = 20.0;

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    TOKEN.find_iter(text).map(|m| m.as_str())
}

fn stem(word: &str) -> String {
    let lower = word.to_lowercase();
    match lower.strip_suffix('s') {
        Some(stripped) if stripped.len() >= 4 && !stripped.ends_with(['s', 'i', 'u']) => {
            stripped.to_string()
        }
        _ => lower,
    }
}

/// Lower-cased, lightly stemmed words of four letters or more, minus stopwords.
pub fn content_words(text: &str) -> BTreeSet<String> {
    tokens(text)
        .map(|t| t.trim_matches(|c: char| c == '\'' || c == ':'))
        .filter(|t| t.chars().count() >= 4)
        .filter(|t| !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .map(stem)
        .collect()
}

/// Whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Prose sentences, ignoring fenced code blocks.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        out.extend(
            SENTENCE_BREAK
                .split(line)
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        );
    }
    out
}

/// Short sentences read clearly; long ones lose points linearly.
pub fn clarity(text: &str) -> f32 {
    let sentences = sentences(text);
    if sentences.is_empty() {
        return if text.trim().is_empty() { 0.0 } else { 0.6 };
    }
    let words: usize = sentences.iter().map(|s| word_count(s)).sum();
    let avg = words as f32 / sentences.len() as f32;
    if avg <= COMFORTABLE_SENTENCE_WORDS {
        1.0
    } else {
        (1.0 - (avg - COMFORTABLE_SENTENCE_WORDS) / 30.0).clamp(0.0, 1.0)
    }
}

/// Share of the query's content words that the response mentions.
pub fn relevance(query: &str, response: &str) -> f32 {
    let wanted = content_words(query);
    if wanted.is_empty() {
        return 1.0;
    }
    let present = content_words(response);
    let hits = wanted.iter().filter(|w| present.contains(*w)).count();
    hits as f32 / wanted.len() as f32
}

/// Share of words that are jargon, identifiers, or paths.
pub fn jargon_density(text: &str) -> f32 {
    let mut total = 0usize;
    let mut jargon = 0usize;
    for token in tokens(text) {
        total += 1;
        let lower = token.to_lowercase();
        let camel = token.chars().skip(1).any(|c| c.is_uppercase())
            && token.chars().any(|c| c.is_lowercase());
        if token.contains('_') || token.contains("::") || camel || JARGON.contains(&lower.as_str())
        {
            jargon += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        jargon as f32 / total as f32
    }
}

/// Whether the text has something the reader can act on: code, a list, or a command.
pub fn has_actionable_structure(text: &str) -> bool {
    text.contains("```")
        || text.contains('`')
        || text.lines().any(|l| {
            let l = l.trim_start();
            l.starts_with("- ")
                || l.starts_with("* ")
                || l.split_once(". ").is_some_and(|(n, _)| n.parse::<u32>().is_ok())
        })
}
