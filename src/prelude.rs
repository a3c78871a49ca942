//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    ConfirmationDecision, Continuation, ContinuationCodec, Decision, DecisionOutcome, Policy,
    ResumeOptions, RunOutcome, RunRequest, RunResult, Runner, ToolExecutor, ToolTaskCodec,
};
pub use crate::config::RunnerConfig;
pub use crate::error::{Result, TurnstileError};
pub use crate::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolSet, ToolsRegistry};
pub use crate::types::{ContentPart, Message, Role, StopReason, StreamEvent, ToolCall, ToolResult, Usage};
