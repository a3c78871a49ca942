//! Runner configuration (layered: code > env > TOML file).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TurnstileError;
use crate::tools::output::MIN_TOOL_OUTPUT_BYTES;
use crate::tools::SummaryMode;

pub const DEFAULT_MAX_TURNS: u32 = 25;
pub const DEFAULT_MAX_TOOL_OUTPUT_BYTES: usize = 65_536;
pub const DEFAULT_MAX_TOOL_CALLS_PER_TURN: usize = 16;
pub const DEFAULT_MAX_TOOL_ARGUMENT_BYTES: usize = 262_144;
pub const DEFAULT_PARALLEL_WIDTH: usize = 4;
pub const DEFAULT_FIXUP_PROMPT: &str =
    "Your last reply was empty. Please provide your final answer based on the tool results above.";

const MAX_TURNS_ENV: &str = "TURNSTILE_MAX_TURNS";
const MAX_TOOL_OUTPUT_BYTES_ENV: &str = "TURNSTILE_MAX_TOOL_OUTPUT_BYTES";
const MAX_TOOL_CALLS_PER_TURN_ENV: &str = "TURNSTILE_MAX_TOOL_CALLS_PER_TURN";
const PARALLEL_WIDTH_ENV: &str = "TURNSTILE_PARALLEL_WIDTH";
const SUMMARY_MODE_ENV: &str = "TURNSTILE_SUMMARY_MODE";
const CONTEXT_WINDOW_ENV: &str = "TURNSTILE_CONTEXT_WINDOW";
const RESERVED_OUTPUT_TOKENS_ENV: &str = "TURNSTILE_RESERVED_OUTPUT_TOKENS";

/// Limits and behavior switches for a [`Runner`](crate::agent_loop::Runner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// LLM calls allowed per run.
    pub max_turns: u32,
    /// Byte budget applied to every tool result.
    pub max_tool_output_bytes: usize,
    /// Tool calls honored per turn; extras are ignored.
    pub max_tool_calls_per_turn: usize,
    /// Serialized argument size above which a call is refused.
    pub max_tool_argument_bytes: usize,
    /// Worker count for [`PooledExecutor`](crate::agent_loop::PooledExecutor).
    pub parallel_width: usize,
    pub summary_mode: SummaryMode,
    /// Enables the token preflight when a counter is also configured.
    pub context_budget: Option<ContextBudget>,
    pub empty_final_fixup: EmptyFinalFixup,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            max_tool_output_bytes: DEFAULT_MAX_TOOL_OUTPUT_BYTES,
            max_tool_calls_per_turn: DEFAULT_MAX_TOOL_CALLS_PER_TURN,
            max_tool_argument_bytes: DEFAULT_MAX_TOOL_ARGUMENT_BYTES,
            parallel_width: DEFAULT_PARALLEL_WIDTH,
            summary_mode: SummaryMode::Safe,
            context_budget: None,
            empty_final_fixup: EmptyFinalFixup::default(),
        }
    }
}

/// Context window accounting for the preflight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub context_window: usize,
    #[serde(default)]
    pub reserved_output_tokens: usize,
}

impl ContextBudget {
    pub fn new(context_window: usize, reserved_output_tokens: usize) -> Self {
        Self {
            context_window,
            reserved_output_tokens,
        }
    }

    /// Prompt tokens a request may use.
    pub fn prompt_budget(&self) -> usize {
        self.context_window.saturating_sub(self.reserved_output_tokens)
    }
}

/// Retry once with a nudge when the model goes quiet after using tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmptyFinalFixup {
    pub enabled: bool,
    /// Withhold tools on the retry turn.
    pub disable_tools: bool,
    pub prompt: String,
}

impl Default for EmptyFinalFixup {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_tools: true,
            prompt: DEFAULT_FIXUP_PROMPT.to_string(),
        }
    }
}

impl RunnerConfig {
    /// Defaults overlaid with `TURNSTILE_*` environment variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(source: &str) -> Result<Self, TurnstileError> {
        toml::from_str(source)
            .map_err(|e| TurnstileError::Configuration(format!("invalid runner config: {e}")))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, TurnstileError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// File values (when a path is given) overlaid with the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, TurnstileError> {
        let _ = dotenvy::dotenv();
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    ///
    /// Unparseable values are logged and skipped.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = read_positive(&lookup, MAX_TURNS_ENV) {
            self.max_turns = u32::try_from(value).unwrap_or(u32::MAX);
        }
        if let Some(value) = read_positive(&lookup, MAX_TOOL_OUTPUT_BYTES_ENV) {
            self.max_tool_output_bytes = value;
        }
        if let Some(value) = read_positive(&lookup, MAX_TOOL_CALLS_PER_TURN_ENV) {
            self.max_tool_calls_per_turn = value;
        }
        if let Some(value) = read_positive(&lookup, PARALLEL_WIDTH_ENV) {
            self.parallel_width = value;
        }
        if let Some(raw) = lookup(SUMMARY_MODE_ENV) {
            match raw.trim().parse::<SummaryMode>() {
                Ok(mode) => self.summary_mode = mode,
                Err(_) => tracing::warn!(key = SUMMARY_MODE_ENV, value = %raw, "ignoring invalid summary mode"),
            }
        }
        if let Some(window) = read_positive(&lookup, CONTEXT_WINDOW_ENV) {
            let reserved = self.context_budget.map_or(0, |b| b.reserved_output_tokens);
            self.context_budget = Some(ContextBudget::new(window, reserved));
        }
        if let Some(raw) = lookup(RESERVED_OUTPUT_TOKENS_ENV) {
            match (raw.trim().parse::<usize>(), self.context_budget.as_mut()) {
                (Ok(reserved), Some(budget)) => budget.reserved_output_tokens = reserved,
                (Ok(_), None) => tracing::warn!(
                    key = RESERVED_OUTPUT_TOKENS_ENV,
                    "reserved output tokens set without a context window; ignoring"
                ),
                (Err(_), _) => tracing::warn!(key = RESERVED_OUTPUT_TOKENS_ENV, value = %raw, "ignoring invalid value"),
            }
        }
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_context_budget(mut self, budget: ContextBudget) -> Self {
        self.context_budget = Some(budget);
        self
    }

    /// Reject values the runner cannot honor.
    pub fn validate(&self) -> Result<(), TurnstileError> {
        if self.max_turns == 0 {
            return Err(config_error("max_turns must be at least 1"));
        }
        validate_output_budget(self.max_tool_output_bytes)?;
        validate_calls_per_turn(self.max_tool_calls_per_turn)?;
        if self.max_tool_argument_bytes == 0 {
            return Err(config_error("max_tool_argument_bytes must be at least 1"));
        }
        if self.parallel_width == 0 {
            return Err(config_error("parallel_width must be at least 1"));
        }
        if let Some(budget) = self.context_budget {
            if budget.context_window == 0 {
                return Err(config_error("context_window must be at least 1"));
            }
            if budget.reserved_output_tokens >= budget.context_window {
                return Err(config_error(format!(
                    "reserved_output_tokens ({}) must be below context_window ({})",
                    budget.reserved_output_tokens, budget.context_window
                )));
            }
        }
        if self.empty_final_fixup.enabled && self.empty_final_fixup.prompt.trim().is_empty() {
            return Err(config_error("empty_final_fixup.prompt must not be blank"));
        }
        Ok(())
    }
}

/// Limits also checked when a persisted run is resumed.
pub(crate) fn validate_output_budget(max_tool_output_bytes: usize) -> Result<(), TurnstileError> {
    if max_tool_output_bytes < MIN_TOOL_OUTPUT_BYTES {
        return Err(config_error(format!(
            "max_tool_output_bytes must be at least {MIN_TOOL_OUTPUT_BYTES}, got {max_tool_output_bytes}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_calls_per_turn(max_tool_calls_per_turn: usize) -> Result<(), TurnstileError> {
    if max_tool_calls_per_turn == 0 {
        return Err(config_error("max_tool_calls_per_turn must be at least 1"));
    }
    Ok(())
}

fn config_error(message: impl Into<String>) -> TurnstileError {
    TurnstileError::Configuration(message.into())
}

fn read_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    let parsed = parse_positive_usize(&raw);
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "ignoring invalid positive integer");
    }
    parsed
}

fn parse_positive_usize(value: &str) -> Option<usize> {
    let parsed = value.trim().parse::<usize>().ok()?;
    if parsed == 0 {
        None
    } else {
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_turns, 25);
        assert_eq!(config.max_tool_output_bytes, 65_536);
        assert!(config.empty_final_fixup.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides_replace_defaults() {
        let config = RunnerConfig::default().with_env_overrides(lookup(&[
            ("TURNSTILE_MAX_TURNS", "3"),
            ("TURNSTILE_PARALLEL_WIDTH", "8"),
            ("TURNSTILE_SUMMARY_MODE", "debug"),
            ("TURNSTILE_CONTEXT_WINDOW", "8000"),
            ("TURNSTILE_RESERVED_OUTPUT_TOKENS", "1000"),
        ]));
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.parallel_width, 8);
        assert_eq!(config.summary_mode, SummaryMode::Debug);
        assert_eq!(config.context_budget, Some(ContextBudget::new(8000, 1000)));
        assert_eq!(config.context_budget.unwrap().prompt_budget(), 7000);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let config = RunnerConfig::default().with_env_overrides(lookup(&[
            ("TURNSTILE_MAX_TURNS", "0"),
            ("TURNSTILE_MAX_TOOL_CALLS_PER_TURN", "many"),
            ("TURNSTILE_SUMMARY_MODE", "verbose"),
        ]));
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn validate_rejects_unusable_limits() {
        let zero_turns = RunnerConfig::default().with_max_turns(0);
        assert!(matches!(
            zero_turns.validate(),
            Err(TurnstileError::Configuration(message)) if message.contains("max_turns")
        ));

        let tiny_output = RunnerConfig {
            max_tool_output_bytes: 10,
            ..RunnerConfig::default()
        };
        assert!(tiny_output.validate().is_err());

        let inverted = RunnerConfig::default().with_context_budget(ContextBudget::new(100, 100));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn toml_sections_fill_in_defaults() {
        let config = RunnerConfig::from_toml_str(
            r#"
            max_turns = 5
            summary_mode = "debug"

            [context_budget]
            context_window = 4096

            [empty_final_fixup]
            disable_tools = false
            "#,
        )
        .unwrap();
        assert_eq!(config.max_turns, 5);
        assert_eq!(config.context_budget, Some(ContextBudget::new(4096, 0)));
        assert!(config.empty_final_fixup.enabled);
        assert!(!config.empty_final_fixup.disable_tools);
        assert_eq!(config.parallel_width, DEFAULT_PARALLEL_WIDTH);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = RunnerConfig::from_toml_str("max_turn = 5").unwrap_err();
        assert!(matches!(err, TurnstileError::Configuration(_)));
    }
}
