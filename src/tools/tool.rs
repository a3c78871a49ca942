//! Tool trait and closure-based tool wrapper.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::arguments::ToolArguments;
use super::types::AgentToolParameters;
use crate::error::TurnstileError;
use crate::provider::ToolDefinition;
use crate::types::ToolResult;

/// Source tag for tools executed inside this process.
pub const LOCAL_SOURCE: &str = "local";

/// Context handed to policies and tools for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolContext {
    pub run_id: Option<Uuid>,
    pub turn: u32,
    /// Tool call id (if provided by the model).
    pub tool_call_id: Option<String>,
    /// Tool name as requested by the model.
    pub tool_name: Option<String>,
    /// Free-form application attributes (tenant, user, request ids).
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ToolContext {
    pub fn for_run(run_id: Uuid, attributes: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            run_id: Some(run_id),
            attributes,
            ..Self::default()
        }
    }

    /// Copy of this context scoped to a single call.
    pub fn for_call(&self, turn: u32, tool_call_id: &str, tool_name: &str) -> Self {
        Self {
            run_id: self.run_id,
            turn,
            tool_call_id: Some(tool_call_id.to_string()),
            tool_name: Some(tool_name.to_string()),
            attributes: self.attributes.clone(),
        }
    }
}

/// A callable tool. Implement directly or use [`AgentTool`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &AgentToolParameters;

    /// Whether calls to this tool may run concurrently with other calls.
    fn parallelizable(&self) -> bool {
        false
    }

    /// Where the tool lives (`local`, an MCP server name, a worker queue).
    fn source(&self) -> &str {
        LOCAL_SOURCE
    }

    /// Execute the tool with parsed arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, TurnstileError>;

    /// Definition advertised to the provider.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters().schema.clone(),
        }
    }
}

/// Type alias for the tool handler function.
type ToolHandler = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, TurnstileError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    parallelizable: bool,
    source: String,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, TurnstileError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            parallelizable: false,
            source: LOCAL_SOURCE.to_string(),
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    /// Mark the tool as safe to run alongside other calls.
    pub fn parallel(mut self) -> Self {
        self.parallelizable = true;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    fn parallelizable(&self) -> bool {
        self.parallelizable
    }

    fn source(&self) -> &str {
        &self.source
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> Result<ToolResult, TurnstileError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parallelizable", &self.parallelizable)
            .field("source", &self.source)
            .finish()
    }
}
