use futures::StreamExt;

use super::super::super::events::RunEventPayload;
use super::super::control::RunEventEmitter;
use super::super::{Runner, StreamCallback};
use crate::error::TurnstileError;
use crate::instrument::{instrument, LLM_CALL_SPAN, PREFLIGHT_SPAN};
use crate::provider::{ProviderRequest, ProviderResponse, ProviderStream};
use crate::types::{Message, Role, StopReason, StreamEvent, Usage};

/// How each turn talks to the provider.
pub(in super::super) enum TurnDriver<'a, 'cb> {
    Sync,
    Streaming(&'a mut StreamCallback<'cb>),
}

impl TurnDriver<'_, '_> {
    fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

pub(super) async fn call_llm(
    runner: &Runner,
    request: &ProviderRequest,
    driver: &mut TurnDriver<'_, '_>,
    turn: u32,
    emitter: &RunEventEmitter,
) -> Result<ProviderResponse, TurnstileError> {
    let payload = serde_json::json!({
        "turn": turn,
        "model": request.model,
        "provider": runner.provider.name(),
        "streaming": driver.is_streaming(),
        "tools_offered": request.tools_offered(),
        "messages": request.messages.len(),
    });
    instrument(runner.instrumenter.as_ref(), LLM_CALL_SPAN, payload, async {
        match driver {
            TurnDriver::Sync => runner.provider.chat(request).await,
            TurnDriver::Streaming(on_event) => {
                let stream = runner.provider.stream(request).await?;
                reduce_stream(stream, &mut **on_event, turn, emitter).await
            }
        }
    })
    .await
}

/// Fold a provider stream into one response, forwarding every event.
///
/// A `MessageComplete` message wins over accumulated deltas. The stream is
/// drained to its end, so events after `Done` still count. A stream that
/// ends without `Done` stops with `tool_use` when the message carries calls.
async fn reduce_stream(
    mut stream: ProviderStream,
    on_event: &mut StreamCallback<'_>,
    turn: u32,
    emitter: &RunEventEmitter,
) -> Result<ProviderResponse, TurnstileError> {
    let mut text = String::new();
    let mut completed: Option<Message> = None;
    let mut done: Option<(StopReason, Option<Usage>)> = None;

    while let Some(event) = stream.next().await {
        let event = event?;
        if done.is_some() {
            tracing::warn!(turn, "provider stream sent events after done");
        }
        on_event(&event)?;
        match event {
            StreamEvent::TextDelta { text: delta } => {
                text.push_str(&delta);
                emitter.emit(RunEventPayload::TextDelta { turn, text: delta });
            }
            StreamEvent::MessageComplete { message } => completed = Some(message),
            StreamEvent::Done { stop_reason, usage } => done = Some((stop_reason, usage)),
        }
    }

    let mut message = completed.unwrap_or_else(|| Message::assistant(text));
    message.role = Role::Assistant;
    let (stop_reason, usage) = done.unwrap_or_else(|| {
        tracing::debug!(turn, "provider stream ended without done event");
        let inferred = if message.has_tool_calls() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        (inferred, None)
    });
    Ok(ProviderResponse {
        message,
        usage,
        stop_reason,
    })
}

/// Refuse the turn when the prompt estimate exceeds the context budget.
///
/// Runs only when both a token counter and a budget are configured.
pub(super) async fn preflight(
    runner: &Runner,
    request: &ProviderRequest,
    turn: u32,
) -> Result<(), TurnstileError> {
    let (Some(counter), Some(budget)) = (
        runner.token_counter.as_ref(),
        runner.config.context_budget.as_ref(),
    ) else {
        return Ok(());
    };
    let payload = serde_json::json!({ "turn": turn, "model": request.model });
    instrument(runner.instrumenter.as_ref(), PREFLIGHT_SPAN, payload, async {
        let tools = request.tools.as_deref().unwrap_or_default();
        let estimated_tokens = counter.count_tokens(&request.messages, tools);
        let budget_tokens = budget.prompt_budget();
        if estimated_tokens > budget_tokens {
            tracing::warn!(turn, estimated_tokens, budget_tokens, "context window exceeded");
            return Err(TurnstileError::ContextWindowExceeded {
                estimated_tokens,
                budget_tokens,
            });
        }
        Ok(())
    })
    .await
}
