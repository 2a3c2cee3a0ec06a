//! Test doubles shared by unit tests across modules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::context::{RequestContext, RequestInfo};
use crate::error::{BrainError, Result};
use crate::llm::TextCompletion;

pub fn ctx_for(message: &str) -> RequestContext {
    RequestContext::new(RequestInfo::new("user-1", "conv-1", message, "trace-test"))
}

/// Replies from a script, then repeats `fallback`. Records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String>>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<String>>, fallback: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: fallback.to_string(),
            ..Default::default()
        }
    }

    pub fn always(text: &str) -> Self {
        Self::new(Vec::new(), text)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[derive(Debug, Default)]
pub struct FailingCompletion;

#[async_trait]
impl TextCompletion for FailingCompletion {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(BrainError::Completion("upstream unavailable".into()))
    }
}

/// Never answers within any reasonable test timeout.
#[derive(Debug)]
pub struct HangingCompletion(pub Duration);

#[async_trait]
impl TextCompletion for HangingCompletion {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late".into())
    }
}
