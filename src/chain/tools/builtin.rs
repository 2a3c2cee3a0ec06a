//! Read-only tools backed by the conversation data provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Tool;
use crate::context::RequestInfo;
use crate::error::Result;
use crate::provider::ConversationDataProvider;

const DEFAULT_LIMIT: usize = 5;

fn limit_arg(args: &Value) -> usize {
    args.get("limit")
        .and_then(Value::as_u64)
        .map(|n| n.clamp(1, 50) as usize)
        .unwrap_or(DEFAULT_LIMIT)
}

/// The user's most recent edits.
pub struct EditHistoryTool {
    provider: Arc<dyn ConversationDataProvider>,
}

impl EditHistoryTool {
    /// Reads recent edits from `provider`.
    pub fn new(provider: Arc<dyn ConversationDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for EditHistoryTool {
    fn name(&self) -> &str {
        "edit_history"
    }

    fn description(&self) -> &str {
        "Recent edits made by the user, newest first"
    }

    async fn invoke(&self, request: &RequestInfo, args: &Value) -> Result<Value> {
        let edits = self
            .provider
            .recent_edits(&request.user_id, limit_arg(args))
            .await?;
        let files: Vec<&str> = edits.iter().map(|e| e.file.as_str()).collect();
        Ok(json!({
            "count": edits.len(),
            "files": files,
            "edits": edits,
        }))
    }
}

/// How often the user kept earlier suggestions.
pub struct AcceptanceStatsTool {
    provider: Arc<dyn ConversationDataProvider>,
}

impl AcceptanceStatsTool {
    /// Summarizes acceptance history from `provider`.
    pub fn new(provider: Arc<dyn ConversationDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for AcceptanceStatsTool {
    fn name(&self) -> &str {
        "acceptance_stats"
    }

    fn description(&self) -> &str {
        "Share of past suggestions the user accepted"
    }

    async fn invoke(&self, request: &RequestInfo, _args: &Value) -> Result<Value> {
        let history = self.provider.acceptance_history(&request.user_id).await?;
        let total = history.len();
        let accepted = history.iter().filter(|r| r.accepted).count();
        let rate = if total == 0 {
            Value::Null
        } else {
            json!(accepted as f64 / total as f64)
        };
        Ok(json!({
            "total": total,
            "accepted": accepted,
            "acceptanceRate": rate,
        }))
    }
}

/// Earlier turns of the current conversation.
pub struct ConversationRecallTool {
    provider: Arc<dyn ConversationDataProvider>,
}

impl ConversationRecallTool {
    /// Recall over the provider's conversation history.
    pub fn new(provider: Arc<dyn ConversationDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for ConversationRecallTool {
    fn name(&self) -> &str {
        "conversation_recall"
    }

    fn description(&self) -> &str {
        "Recent turns of the current conversation"
    }

    async fn invoke(&self, request: &RequestInfo, args: &Value) -> Result<Value> {
        let history = self
            .provider
            .conversation_history(&request.conversation_id, limit_arg(args))
            .await?;
        let user_messages: Vec<&str> = history.user_messages().collect();
        Ok(json!({
            "turns": history.turns.len(),
            "userMessages": user_messages,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ConversationTurn, InMemoryDataProvider};

    fn setup() -> (Arc<InMemoryDataProvider>, RequestInfo) {
        let provider = Arc::new(InMemoryDataProvider::new());
        provider.record_edit("u1", "src/cache.rs", "raise ttl");
        provider.record_edit("u1", "src/main.rs", "wire cache");
        provider.record_acceptance("u1", "s1", true);
        provider.record_acceptance("u1", "s2", true);
        provider.record_acceptance("u1", "s3", false);
        provider.push_turn("c1", ConversationTurn::user("why is the cache cold?"));
        provider.push_turn("c1", ConversationTurn::assistant("Check the ttl."));
        (provider, RequestInfo::new("u1", "c1", "still cold", "t"))
    }

    #[tokio::test]
    async fn test_edit_history() {
        let (p, req) = setup();
        let out = EditHistoryTool::new(p).invoke(&req, &json!({"limit": 1})).await.unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["files"][0], "src/main.rs");
    }

    #[tokio::test]
    async fn test_acceptance_stats() {
        let (p, req) = setup();
        let out = AcceptanceStatsTool::new(p).invoke(&req, &json!({})).await.unwrap();
        assert_eq!(out["total"], 3);
        assert_eq!(out["accepted"], 2);
        let rate = out["acceptanceRate"].as_f64().unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_acceptance_stats_without_history() {
        let p = Arc::new(InMemoryDataProvider::new());
        let req = RequestInfo::new("nobody", "c", "m", "t");
        let out = AcceptanceStatsTool::new(p).invoke(&req, &json!({})).await.unwrap();
        assert!(out["acceptanceRate"].is_null());
    }

    #[tokio::test]
    async fn test_conversation_recall() {
        let (p, req) = setup();
        let out = ConversationRecallTool::new(p).invoke(&req, &Value::Null).await.unwrap();
        assert_eq!(out["turns"], 2);
        assert_eq!(out["userMessages"][0], "why is the cache cold?");
    }
}
