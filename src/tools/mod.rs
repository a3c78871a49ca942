//! Tool system: tool definitions, the registry seam, and output shaping.

pub mod arguments;
pub mod output;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use output::{
    limit_tool_result, summarize_tool_arguments, summarize_tool_result, SummaryMode,
};
pub use registry::{underscore_alias, AliasResolver, ToolMetadata, ToolSet, ToolsRegistry};
pub use tool::{AgentTool, Tool, ToolContext, LOCAL_SOURCE};
pub use types::{AgentToolParameters, ParameterBuilder};
