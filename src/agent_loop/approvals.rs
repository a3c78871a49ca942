//! Authorization types: policies, decisions, and pending confirmations.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::tools::ToolContext;

/// Verdict for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Allow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Deny {
        reason: String,
    },
    /// Needs a human (or other out-of-band) decision before running.
    Confirm {
        reason: String,
    },
}

impl Decision {
    pub fn allow() -> Self {
        Self::Allow { reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    pub fn confirm(reason: impl Into<String>) -> Self {
        Self::Confirm {
            reason: reason.into(),
        }
    }

    pub fn outcome(&self) -> DecisionOutcome {
        match self {
            Self::Allow { .. } => DecisionOutcome::Allow,
            Self::Deny { .. } => DecisionOutcome::Deny,
            Self::Confirm { .. } => DecisionOutcome::Confirm,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow { reason } => reason.as_deref(),
            Self::Deny { reason } | Self::Confirm { reason } => Some(reason),
        }
    }
}

/// Decision kind without its reason.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DecisionOutcome {
    Allow,
    Deny,
    Confirm,
}

impl From<DecisionOutcome> for Decision {
    fn from(outcome: DecisionOutcome) -> Self {
        match outcome {
            DecisionOutcome::Allow => Decision::allow(),
            DecisionOutcome::Deny => Decision::deny("denied by policy"),
            DecisionOutcome::Confirm => Decision::confirm("confirmation required"),
        }
    }
}

/// Decides whether a tool call may run.
///
/// `name` is the registry name the call resolves to, so a rule on
/// `files_read` also covers a model asking for `files.read`.
#[async_trait]
pub trait Policy: Send + Sync {
    async fn authorize(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        ctx: &ToolContext,
    ) -> Decision;
}

/// Allows every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Policy for AllowAll {
    async fn authorize(&self, _name: &str, _arguments: &serde_json::Value, _ctx: &ToolContext) -> Decision {
        Decision::allow()
    }
}

/// Denies every call.
#[derive(Debug, Clone, Default)]
pub struct DenyAll {
    reason: Option<String>,
}

impl DenyAll {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
impl Policy for DenyAll {
    async fn authorize(&self, _name: &str, _arguments: &serde_json::Value, _ctx: &ToolContext) -> Decision {
        Decision::deny(self.reason.as_deref().unwrap_or("tool use is disabled"))
    }
}

/// Per-tool outcomes with a fallback for unlisted tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RulePolicy {
    pub default: DecisionOutcome,
    #[serde(default)]
    pub rules: HashMap<String, DecisionOutcome>,
}

impl RulePolicy {
    pub fn new(default: DecisionOutcome) -> Self {
        Self {
            default,
            rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, tool_name: impl Into<String>, outcome: DecisionOutcome) -> Self {
        self.rules.insert(tool_name.into(), outcome);
        self
    }

    pub fn outcome_for(&self, tool_name: &str) -> DecisionOutcome {
        self.rules.get(tool_name).copied().unwrap_or(self.default)
    }
}

#[async_trait]
impl Policy for RulePolicy {
    async fn authorize(&self, name: &str, _arguments: &serde_json::Value, _ctx: &ToolContext) -> Decision {
        match self.outcome_for(name) {
            DecisionOutcome::Allow => Decision::allow(),
            DecisionOutcome::Deny => Decision::deny(format!("tool '{name}' is denied by policy")),
            DecisionOutcome::Confirm => {
                Decision::confirm(format!("tool '{name}' requires confirmation"))
            }
        }
    }
}

/// Async closure used by [`FnPolicy`].
pub type PolicyHandler = Arc<
    dyn Fn(String, serde_json::Value, ToolContext) -> Pin<Box<dyn Future<Output = Decision> + Send>>
        + Send
        + Sync,
>;

/// Policy backed by a closure.
#[derive(Clone)]
pub struct FnPolicy {
    handler: PolicyHandler,
}

impl FnPolicy {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(String, serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Decision> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |name, args, ctx| Box::pin(handler(name, args, ctx))),
        }
    }
}

impl std::fmt::Debug for FnPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPolicy").finish_non_exhaustive()
    }
}

#[async_trait]
impl Policy for FnPolicy {
    async fn authorize(&self, name: &str, arguments: &serde_json::Value, ctx: &ToolContext) -> Decision {
        (self.handler)(name.to_string(), arguments.clone(), ctx.clone()).await
    }
}

/// A tool call waiting for a confirmation decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingToolConfirmation {
    pub tool_call_id: String,
    /// Name requested by the model.
    pub name: String,
    /// Registry name the call resolves to.
    pub executed_name: String,
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub arguments_summary: String,
}

/// Caller's answer for one pending confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConfirmationDecision {
    Allow,
    Deny {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ConfirmationDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: Some(reason.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}
