//! Error types for Turnstile.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Context window exceeded: estimated {estimated_tokens} tokens, budget {budget_tokens} tokens"
    )]
    ContextWindowExceeded {
        estimated_tokens: usize,
        budget_tokens: usize,
    },

    #[error("Resume rejected: {0}")]
    Resume(#[from] ResumeError),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Why a `resume` / `resume_with_tool_results` call was rejected.
///
/// Every variant is raised before the continuation is touched, so the same
/// call can be retried with corrected input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResumeError {
    #[error("continuation is paused for {actual}, expected {expected}")]
    PauseReasonMismatch { expected: String, actual: String },

    #[error("missing confirmation for tool calls: {}", .0.join(", "))]
    MissingConfirmations(Vec<String>),

    #[error("duplicate confirmation for tool call '{0}'")]
    DuplicateConfirmation(String),

    #[error("confirmation supplied for unknown tool calls: {}", .0.join(", "))]
    UnexpectedConfirmations(Vec<String>),

    #[error("missing tool results for tool calls: {}", .0.join(", "))]
    MissingToolResults(Vec<String>),

    #[error("duplicate tool result for tool call '{0}'")]
    DuplicateToolResult(String),

    #[error("tool result supplied for unknown tool calls: {}", .0.join(", "))]
    UnexpectedToolResults(Vec<String>),

    #[error("tool result for '{0}' conflicts with an already buffered result")]
    ConflictingToolResult(String),
}

/// Failures while (de)serializing persisted continuations and task batches.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("missing schema_version")]
    MissingSchemaVersion,

    #[error("unsupported schema_version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: String, supported: u32 },

    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid continuation: {0}")]
    InvalidContinuation(String),

    #[error("tool tasks require pause_reason awaiting_tool_results, got {0}")]
    NotAwaitingToolResults(String),
}

impl TurnstileError {
    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool_execution(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::ContextWindowExceeded { .. } => ErrorCategory::ContextWindow,
            Self::Resume(_) => ErrorCategory::ResumeValidation,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::Stream(_) => ErrorCategory::Stream,
            Self::Codec(_) | Self::Serialization(_) => ErrorCategory::Serialization,
            Self::ToolExecution { .. } | Self::ToolNotFound(_) | Self::InvalidArgument(_) => {
                ErrorCategory::ToolExecution
            }
            Self::Io(_) | Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// The runner never retries on its own; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Provider | ErrorCategory::Stream
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ContextWindow => RecoverySuggestion::ReduceInputSize,
            ErrorCategory::ResumeValidation => RecoverySuggestion::FixResumeInput,
            ErrorCategory::Provider | ErrorCategory::Stream => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Serialization => RecoverySuggestion::CheckPersistedState,
            ErrorCategory::Unknown => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TurnstileError>;
