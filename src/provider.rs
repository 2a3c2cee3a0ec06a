//! Read-only conversation, edit, and feedback data.
//!
//! The storage behind these queries lives outside the chain; stages and
//! tools only see the [`ConversationDataProvider`] trait. Every call made
//! from the chain is bounded by the configured provider timeout.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    /// A user turn, timestamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    /// An assistant turn, timestamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Most recent turns of one conversation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistory {
    pub conversation_id: String,
    pub turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Content of the user's turns, oldest first.
    pub fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }
}

/// A file edit made by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub file: String,
    pub summary: String,
    pub at: DateTime<Utc>,
}

/// Whether the user kept a suggestion the assistant made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceRecord {
    pub suggestion_id: String,
    pub accepted: bool,
    pub at: DateTime<Utc>,
}

/// Read-only access to the data the tools and conductor consult.
#[async_trait]
pub trait ConversationDataProvider: Send + Sync {
    /// Up to `limit` most recent turns, oldest first.
    async fn conversation_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<ConversationHistory>;

    /// Up to `limit` most recent edits, newest first.
    async fn recent_edits(&self, user_id: &str, limit: usize) -> Result<Vec<EditRecord>>;

    async fn acceptance_history(&self, user_id: &str) -> Result<Vec<AcceptanceRecord>>;
}

/// Process-local provider for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryDataProvider {
    conversations: RwLock<HashMap<String, Vec<ConversationTurn>>>,
    edits: RwLock<HashMap<String, Vec<EditRecord>>>,
    acceptance: RwLock<HashMap<String, Vec<AcceptanceRecord>>>,
}

impl InMemoryDataProvider {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn to a conversation.
    pub fn push_turn(&self, conversation_id: &str, turn: ConversationTurn) {
        self.conversations
            .write()
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn);
    }

    /// Record an edit for a user, timestamped now.
    pub fn record_edit(&self, user_id: &str, file: &str, summary: &str) {
        self.edits
            .write()
            .entry(user_id.to_string())
            .or_default()
            .push(EditRecord {
                file: file.to_string(),
                summary: summary.to_string(),
                at: Utc::now(),
            });
    }

    /// Record whether a user accepted a suggestion.
    pub fn record_acceptance(&self, user_id: &str, suggestion_id: &str, accepted: bool) {
        self.acceptance
            .write()
            .entry(user_id.to_string())
            .or_default()
            .push(AcceptanceRecord {
                suggestion_id: suggestion_id.to_string(),
                accepted,
                at: Utc::now(),
            });
    }
}

#[async_trait]
impl ConversationDataProvider for InMemoryDataProvider {
    async fn conversation_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<ConversationHistory> {
        let conversations = self.conversations.read();
        let turns = conversations
            .get(conversation_id)
            .map(|turns| {
                let start = turns.len().saturating_sub(limit);
                turns[start..].to_vec()
            })
            .unwrap_or_default();
        Ok(ConversationHistory {
            conversation_id: conversation_id.to_string(),
            turns,
        })
    }

    async fn recent_edits(&self, user_id: &str, limit: usize) -> Result<Vec<EditRecord>> {
        let edits = self.edits.read();
        Ok(edits
            .get(user_id)
            .map(|e| e.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn acceptance_history(&self, user_id: &str) -> Result<Vec<AcceptanceRecord>> {
        Ok(self
            .acceptance
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}
