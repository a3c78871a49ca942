//! Tool registry: lookup, alias resolution and execution by name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolContext};
use crate::error::TurnstileError;
use crate::provider::ToolDefinition;
use crate::types::ToolResult;

/// Registry-side facts about a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMetadata {
    pub name: String,
    pub parallelizable: bool,
    pub source: String,
}

/// Capability interface the runner needs from a tool collection.
#[async_trait]
pub trait ToolsRegistry: Send + Sync {
    /// Execute a tool by its registered name.
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, TurnstileError>;

    /// Metadata for a registered name, `None` when unknown.
    fn find(&self, name: &str) -> Option<ToolMetadata>;

    fn includes(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Map a requested name to a registered one.
    ///
    /// The literal name wins; registries may fall back to an alias.
    fn resolve(&self, name: &str) -> Option<String> {
        self.includes(name).then(|| name.to_string())
    }

    /// Schemas offered to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// Maps an unregistered name to a candidate alias.
pub type AliasResolver = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// `files.read` -> `files_read`.
pub fn underscore_alias(name: &str) -> Option<String> {
    name.contains('.').then(|| name.replace('.', "_"))
}

/// In-process registry backed by [`Tool`] implementations.
#[derive(Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    alias: Option<AliasResolver>,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            alias: Some(Arc::new(underscore_alias)),
        }
    }

    /// Register a tool. A later tool with the same name replaces the earlier one.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Replace the alias rule.
    pub fn with_alias_resolver(mut self, resolver: AliasResolver) -> Self {
        self.alias = Some(resolver);
        self
    }

    /// Only literal names resolve.
    pub fn without_aliases(mut self) -> Self {
        self.alias = None;
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|tool| tool.name()).collect();
        f.debug_struct("ToolSet")
            .field("tools", &names)
            .field("aliases", &self.alias.is_some())
            .finish()
    }
}

#[async_trait]
impl ToolsRegistry for ToolSet {
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, TurnstileError> {
        let tool = self
            .get(name)
            .ok_or_else(|| TurnstileError::ToolNotFound(name.to_string()))?;
        tool.execute(&ToolArguments::new(arguments.clone()), ctx)
            .await
    }

    fn find(&self, name: &str) -> Option<ToolMetadata> {
        self.get(name).map(|tool| ToolMetadata {
            name: tool.name().to_string(),
            parallelizable: tool.parallelizable(),
            source: tool.source().to_string(),
        })
    }

    fn resolve(&self, name: &str) -> Option<String> {
        if self.index.contains_key(name) {
            return Some(name.to_string());
        }
        let resolver = self.alias.as_ref()?;
        let alias = resolver(name)?;
        self.index.contains_key(&alias).then_some(alias)
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }
}
