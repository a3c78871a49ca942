//! Error classification and recovery hints.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ContextWindow,
    ResumeValidation,
    Provider,
    Stream,
    Serialization,
    ToolExecution,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckConfiguration,
    ReduceInputSize,
    FixResumeInput,
    CheckPersistedState,
    CheckToolImplementation,
    ContactSupport,
}
