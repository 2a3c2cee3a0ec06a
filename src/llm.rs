//! Text-completion capability.
//!
//! The chain treats completion as an opaque call: prompt in, text out. It
//! may fail or hang, so every call site wraps it in [`with_timeout`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{BrainError, Result};

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Bound `fut` by `limit`, mapping expiry to [`BrainError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BrainError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleCompletion {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiCompatibleCompletion {
    /// Client for `{base_url}/chat/completions` using `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            temperature: 0.3,
            max_retries: 2,
        }
    }

    /// Send `Authorization: Bearer <api_key>`.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sampling temperature; defaults to 0.3.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Retries on transport errors, 429 and 5xx; defaults to 2.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl TextCompletion for OpenAiCompatibleCompletion {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(prompt);
        let mut retry_delay = Duration::from_millis(250);
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "Completion retry {} after {:?}: {}",
                    attempt,
                    retry_delay,
                    last_error
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let mut request = self.client.post(&endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = format!("endpoint returned {}", status);
                continue;
            }
            if status.is_client_error() {
                let text = response.text().await.unwrap_or_default();
                return Err(BrainError::Completion(format!(
                    "endpoint returned {}: {}",
                    status, text
                )));
            }

            let json: Value = response
                .json()
                .await
                .map_err(|e| BrainError::Completion(format!("invalid response body: {}", e)))?;
            return extract_content(&json);
        }

        Err(BrainError::Completion(format!(
            "gave up after {} attempts: {}",
            self.max_retries + 1,
            last_error
        )))
    }
}

fn extract_content(json: &Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BrainError::Completion("response has no message content".into()))
}

/// Offline, deterministic completion.
///
/// Answers the `Question:` line of the prompt with a short numbered plan.
/// Used when no endpoint is configured, and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoCompletion;

#[async_trait]
impl TextCompletion for EchoCompletion {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let question = prompt
            .lines()
            .rev()
            .find_map(|l| l.trim().strip_prefix("Question:"))
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| prompt.trim());
        if question.is_empty() {
            return Err(BrainError::Completion("empty prompt".into()));
        }
        Ok(format!(
            "Here is how to approach this: {question}\n\n\
             1. Reproduce the problem with the smallest input that shows it.\n\
             2. Compare the failing setup with the documented configuration.\n\
             3. Apply the change, then run the tests again to confirm the fix."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_answers_question_line() {
        let out = EchoCompletion
            .complete("Strategy: direct\nQuestion: why is my cache cold?")
            .await
            .unwrap();
        assert!(out.contains("why is my cache cold?"));
        assert!(out.contains("1. "));
    }

    #[tokio::test]
    async fn test_echo_rejects_empty_prompt() {
        assert!(matches!(
            EchoCompletion.complete("   ").await,
            Err(BrainError::Completion(_))
        ));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_expiry() {
        let err = with_timeout("completion", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BrainError>(())
        })
        .await
        .unwrap_err();
        match err {
            BrainError::Timeout {
                operation,
                after_ms,
            } => {
                assert_eq!(operation, "completion");
                assert_eq!(after_ms, 10);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let v = with_timeout("x", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_extract_content() {
        let ok = json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(extract_content(&ok).unwrap(), "hi");
        assert!(extract_content(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let c = OpenAiCompatibleCompletion::new("http://localhost:1234/v1/", "local-model")
            .with_temperature(0.0);
        assert_eq!(c.base_url, "http://localhost:1234/v1");
        let body = c.request_body("hello");
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_completion_error() {
        let c = OpenAiCompatibleCompletion::new("http://127.0.0.1:9", "m").with_max_retries(0);
        assert!(matches!(
            c.complete("hi").await,
            Err(BrainError::Completion(_))
        ));
    }
}
