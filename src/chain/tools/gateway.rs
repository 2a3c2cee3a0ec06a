//! The single path from a stage to a tool.

use std::sync::Arc;
use std::time::Duration;

use super::{ToolOutcome, ToolRegistry, ToolRequest};
use crate::chain::stage::PolicyRejection;
use crate::context::keys::TOOL_GUARD;
use crate::context::RequestContext;
use crate::error::BrainError;
use crate::llm::with_timeout;

/// Guard-checked, time-limited tool invocation.
#[derive(Debug, Clone)]
pub struct ToolGateway {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolGateway {
    /// Gateway over `registry`; each call is cut off after `timeout`.
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Try the requested tool, then each named fallback, in order.
    ///
    /// Every candidate is checked against the request's [`ToolGuard`](super::ToolGuard)
    /// first. Without a guard in the context, every call is rejected.
    pub async fn invoke(&self, ctx: &RequestContext, request: &ToolRequest) -> ToolOutcome {
        let stage = ctx.current_writer().stage.clone();
        let info = ctx.request().clone();
        let mut first_rejection: Option<PolicyRejection> = None;
        let mut last_failure: Option<(String, String)> = None;

        for candidate in request.candidates() {
            let decision = match ctx.get(TOOL_GUARD) {
                Ok(guard) => guard.authorize(candidate, &stage),
                Err(_) => Err(PolicyRejection {
                    tool: candidate.to_string(),
                    reason: "no tool policy installed for this request".to_string(),
                    stage: stage.clone(),
                }),
            };
            if let Err(rejection) = decision {
                log::warn!("[{}] ToolGateway: {}", info.trace_id, rejection);
                first_rejection.get_or_insert(rejection);
                continue;
            }

            let Some(tool) = self.registry.get(candidate) else {
                let e = BrainError::UnknownTool(candidate.to_string());
                log::warn!("[{}] ToolGateway: {}", info.trace_id, e);
                last_failure = Some((candidate.to_string(), e.to_string()));
                continue;
            };

            let operation = format!("tool '{}'", candidate);
            match with_timeout(&operation, self.timeout, tool.invoke(&info, &request.args)).await {
                Ok(output) => {
                    log::debug!("[{}] ToolGateway: '{}' completed", info.trace_id, candidate);
                    return ToolOutcome::Completed {
                        tool: candidate.to_string(),
                        output,
                    };
                }
                Err(e) => {
                    log::warn!("[{}] ToolGateway: '{}' failed: {}", info.trace_id, candidate, e);
                    last_failure = Some((candidate.to_string(), e.to_string()));
                }
            }
        }

        match (last_failure, first_rejection) {
            (Some((tool, error)), _) => ToolOutcome::Failed { tool, error },
            (None, Some(rejection)) => ToolOutcome::Rejected(rejection),
            (None, None) => ToolOutcome::Failed {
                tool: request.tool.clone(),
                error: "no candidate tools".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tools::{EnforcementMode, Tool, ToolGuard};
    use crate::context::{Phase, RequestInfo};
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
        fail: bool,
        slow: bool,
    }

    #[async_trait]
    impl Tool for Counting {
        fn name(&self) -> &str {
            self.name
        }
        async fn invoke(&self, request: &RequestInfo, _args: &Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.slow {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.fail {
                return Err(BrainError::Tool {
                    tool: self.name.into(),
                    message: "backend down".into(),
                });
            }
            Ok(json!({ "tool": self.name, "user": request.user_id }))
        }
    }

    fn counting(name: &'static str) -> Arc<Counting> {
        Arc::new(Counting {
            name,
            ..Default::default()
        })
    }

    struct Fixture {
        gateway: ToolGateway,
        ctx: RequestContext,
    }

    fn fixture(tools: &[Arc<Counting>], allowed: &[&str], mode: EnforcementMode) -> Fixture {
        let mut registry = ToolRegistry::new();
        for t in tools {
            registry.register(Arc::clone(t) as Arc<dyn Tool>);
        }
        let mut ctx = RequestContext::new(RequestInfo::new("u1", "c1", "hi", "t1"));
        let guard = ToolGuard::new(allowed.iter().map(|s| s.to_string()).collect(), mode);
        ctx.put_frozen(TOOL_GUARD, guard).unwrap();
        Fixture {
            gateway: ToolGateway::new(Arc::new(registry), Duration::from_millis(50)),
            ctx,
        }
    }

    #[tokio::test]
    async fn test_disallowed_tool_rejected_without_substitution() {
        let shell = counting("shell");
        let recall = counting("conversation_recall");
        let mut f = fixture(
            &[shell.clone(), recall.clone()],
            &["conversation_recall"],
            EnforcementMode::Strict,
        );
        let outcome = {
            let mut phase = Phase::begin(&mut f.ctx, "context_gather", 25);
            f.gateway
                .invoke(phase.ctx(), &ToolRequest::new("shell", json!({})))
                .await
        };
        match outcome {
            ToolOutcome::Rejected(r) => {
                assert_eq!(r.tool, "shell");
                assert_eq!(r.stage, "context_gather");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(shell.calls.load(Ordering::SeqCst), 0);
        // The allowed but unrelated tool was not used in its place.
        assert_eq!(recall.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.ctx.get(TOOL_GUARD).unwrap().audit_count(), 1);
    }

    #[tokio::test]
    async fn test_explicit_fallback_is_used() {
        let edits = counting("edit_history");
        let recall = counting("conversation_recall");
        let mut f = fixture(
            &[edits.clone(), recall.clone()],
            &["conversation_recall"],
            EnforcementMode::Strict,
        );
        let request = ToolRequest::new("edit_history", json!({})).with_fallback("conversation_recall");
        let outcome = f.gateway.invoke(&mut f.ctx, &request).await;
        assert!(matches!(outcome, ToolOutcome::Completed { ref tool, .. } if tool == "conversation_recall"));
        assert_eq!(edits.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_and_timeout_reported() {
        let broken = Arc::new(Counting {
            name: "broken",
            fail: true,
            ..Default::default()
        });
        let slow = Arc::new(Counting {
            name: "slow",
            slow: true,
            ..Default::default()
        });
        let mut f = fixture(&[broken, slow], &["broken", "slow"], EnforcementMode::Strict);

        let outcome = f.gateway.invoke(&mut f.ctx, &ToolRequest::new("broken", json!({}))).await;
        assert!(matches!(outcome, ToolOutcome::Failed { ref error, .. } if error.contains("backend down")));

        let outcome = f.gateway.invoke(&mut f.ctx, &ToolRequest::new("slow", json!({}))).await;
        assert!(matches!(outcome, ToolOutcome::Failed { ref error, .. } if error.contains("timed out")));
    }

    #[tokio::test]
    async fn test_no_guard_fails_closed() {
        let tool = counting("edit_history");
        let mut ctx = RequestContext::new(RequestInfo::new("u", "c", "m", "t"));
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone() as Arc<dyn Tool>);
        let gateway = ToolGateway::new(Arc::new(registry), Duration::from_secs(1));
        let outcome = gateway
            .invoke(&mut ctx, &ToolRequest::new("edit_history", json!({})))
            .await;
        assert!(matches!(outcome, ToolOutcome::Rejected(_)));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_audit_only_executes_unlisted_tool() {
        let tool = counting("shell");
        let mut f = fixture(&[tool.clone()], &[], EnforcementMode::AuditOnly);
        let outcome = f.gateway.invoke(&mut f.ctx, &ToolRequest::new("shell", json!({}))).await;
        assert!(outcome.is_completed());
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }
}
