//! Allow-list enforcement for tool calls.
//!
//! The guard is built from the plan's allow-list by the tool-policy stage and
//! lives in the request context. It fails closed: anything not on the list
//! is refused in `Strict` mode. `AuditOnly` logs the violation and lets the
//! call through, for dry runs of a new policy.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::chain::stage::PolicyRejection;

/// What the guard does with a call that is not on the allow-list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    #[default]
    Strict,
    AuditOnly,
}

/// One guard decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub tool: String,
    pub stage: String,
    pub allowed: bool,
    /// False when a violation was only logged (`AuditOnly`).
    pub enforced: bool,
    pub at: DateTime<Utc>,
}

/// Installed frozen; only the audit log changes after that, behind its own lock.
#[derive(Debug)]
pub struct ToolGuard {
    allow_list: BTreeSet<String>,
    enforcement: EnforcementMode,
    audit_log: Mutex<VecDeque<AuditEntry>>,
    max_audit_entries: usize,
}

impl ToolGuard {
    pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 256;

    /// Guard over `allow_list` with the default audit capacity.
    pub fn new(allow_list: BTreeSet<String>, enforcement: EnforcementMode) -> Self {
        Self {
            allow_list,
            enforcement,
            audit_log: Mutex::new(VecDeque::new()),
            max_audit_entries: Self::DEFAULT_MAX_AUDIT_ENTRIES,
        }
    }

    /// Cap the audit log; the oldest entries are dropped first.
    pub fn with_max_audit_entries(mut self, max: usize) -> Self {
        self.max_audit_entries = max.max(1);
        self
    }

    pub fn enforcement(&self) -> EnforcementMode {
        self.enforcement
    }

    /// Whether `tool` is on the allow-list, regardless of mode.
    pub fn is_allowed(&self, tool: &str) -> bool {
        self.allow_list.contains(tool)
    }

    /// Decide on one call by `stage` to `tool`, and audit the decision.
    pub fn authorize(&self, tool: &str, stage: &str) -> Result<(), PolicyRejection> {
        if self.is_allowed(tool) {
            self.audit(tool, stage, true, true);
            return Ok(());
        }
        match self.enforcement {
            EnforcementMode::Strict => {
                self.audit(tool, stage, false, true);
                Err(PolicyRejection {
                    tool: tool.to_string(),
                    reason: "not on the plan's tool allow-list".to_string(),
                    stage: stage.to_string(),
                })
            }
            EnforcementMode::AuditOnly => {
                log::warn!(
                    "ToolGuard: '{}' is not allowed for '{}' (audit only, letting it through)",
                    tool,
                    stage
                );
                self.audit(tool, stage, false, false);
                Ok(())
            }
        }
    }

    fn audit(&self, tool: &str, stage: &str, allowed: bool, enforced: bool) {
        let mut log = self.audit_log.lock();
        if log.len() >= self.max_audit_entries {
            log.pop_front();
        }
        log.push_back(AuditEntry {
            tool: tool.to_string(),
            stage: stage.to_string(),
            allowed,
            enforced,
            at: Utc::now(),
        });
    }

    /// Snapshot of the audit log, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit_log.lock().iter().cloned().collect()
    }

    /// Entries currently retained.
    pub fn audit_count(&self) -> usize {
        self.audit_log.lock().len()
    }
}
