//! Tests for the continuation and tool task codecs.

mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use common::{echo_tool, MockProvider};
use pretty_assertions::assert_eq;
use serde_json::json;
use turnstile::agent_loop::{
    AttributeSelection, Continuation, ContinuationCodec, DecisionOutcome, DeferredExecutor,
    PauseReason, RulePolicy, RunRequest, Runner, ToolTaskCodec, CONTINUATION_SCHEMA_VERSION,
};
use turnstile::error::{CodecError, TurnstileError};
use turnstile::provider::RequestOptions;
use turnstile::tools::ToolSet;
use turnstile::types::{Message, ToolCall};

async fn paused_run(deferred: bool) -> Continuation {
    let provider = Arc::new(MockProvider::new());
    provider.queue_tool_calls(vec![
        ToolCall::new("c1", "search", json!({ "text": "rust" })),
        ToolCall::new("c2", "search", json!({ "text": "serde" })),
    ]);
    let tools = ToolSet::new().with_tool(echo_tool("search", Arc::new(AtomicUsize::new(0))));
    let mut runner = Runner::new(provider, Arc::new(tools));
    runner = if deferred {
        runner.with_executor(Arc::new(DeferredExecutor))
    } else {
        runner.with_policy(Arc::new(RulePolicy::new(DecisionOutcome::Confirm)))
    };
    let request = RunRequest::new("mock-model", vec![Message::user("find things")])
        .with_context_attribute("tenant", "acme")
        .with_context_attribute("notes", "n".repeat(4_000));
    runner.run(request).await.unwrap().paused().unwrap()
}

#[tokio::test]
async fn dump_then_load_preserves_the_continuation() {
    let continuation = paused_run(false).await;
    let codec = ContinuationCodec::new().with_attributes(AttributeSelection::keys(["tenant"]));

    let dumped = codec.dump(&continuation).unwrap();
    assert_eq!(dumped["schema_version"], CONTINUATION_SCHEMA_VERSION);
    assert_eq!(dumped["pause_reason"], "awaiting_tool_confirmation");

    let loaded = codec.load(dumped).unwrap();
    let mut expected = continuation.clone();
    expected.context_attributes.remove("notes");
    assert_eq!(loaded, expected);
}

#[tokio::test]
async fn text_round_trip_keeps_floats_bit_exact() {
    let provider = Arc::new(MockProvider::new());
    provider.queue_tool_calls(vec![ToolCall::new(
        "c1",
        "search",
        json!({ "text": "rust", "weight": 0.1 + 0.2 }),
    )]);
    let tools = ToolSet::new().with_tool(echo_tool("search", Arc::new(AtomicUsize::new(0))));
    let runner = Runner::new(provider, Arc::new(tools)).with_executor(Arc::new(DeferredExecutor));
    let options = RequestOptions::builder()
        .temperature(0.47960756426982587)
        .top_p(0.7071067811865476)
        .build();
    let request = RunRequest::new("mock-model", vec![Message::user("find things")])
        .with_options(options)
        .with_context_attribute("threshold", 0.30000000000000004);
    let continuation = runner.run(request).await.unwrap().paused().unwrap();
    let codec = ContinuationCodec::new().with_attributes(AttributeSelection::All);

    let loaded = codec.load_str(&codec.dump_string(&continuation).unwrap()).unwrap();

    assert_eq!(loaded, continuation);
    assert_eq!(loaded.options.temperature, Some(0.47960756426982587));
    assert_eq!(loaded.context_attributes["threshold"], json!(0.30000000000000004));
}

#[tokio::test]
async fn unselected_attributes_are_not_persisted_and_long_ones_are_cut() {
    let continuation = paused_run(false).await;

    let none = ContinuationCodec::new().dump(&continuation).unwrap();
    assert_eq!(none["context_attributes"], json!({}));

    let all = ContinuationCodec::new()
        .with_attributes(AttributeSelection::All)
        .dump(&continuation)
        .unwrap();
    assert_eq!(all["context_attributes"]["tenant"], "acme");
    assert_eq!(all["context_attributes"]["notes"].as_str().unwrap().len(), 1024);
}

#[tokio::test]
async fn unknown_or_missing_schema_versions_are_rejected() {
    let continuation = paused_run(false).await;
    let codec = ContinuationCodec::new();
    let mut dumped = codec.dump(&continuation).unwrap();

    dumped["schema_version"] = json!(CONTINUATION_SCHEMA_VERSION + 1);
    let err = codec.load(dumped.clone()).unwrap_err();
    assert!(matches!(
        err,
        TurnstileError::Codec(CodecError::UnsupportedSchemaVersion { .. })
    ));

    dumped.as_object_mut().unwrap().remove("schema_version");
    let err = codec.load(dumped).unwrap_err();
    assert!(matches!(err, TurnstileError::Codec(CodecError::MissingSchemaVersion)));
}

#[tokio::test]
async fn structurally_broken_payloads_are_rejected() {
    let continuation = paused_run(false).await;
    let codec = ContinuationCodec::new();

    let mut wrong_pending = codec.dump(&continuation).unwrap();
    wrong_pending["pause_reason"] = json!("awaiting_tool_results");
    let err = codec.load(wrong_pending).unwrap_err();
    assert!(matches!(err, TurnstileError::Codec(CodecError::InvalidContinuation(_))));

    let mut malformed = codec.dump(&continuation).unwrap();
    malformed["turn"] = json!("one");
    let err = codec.load(malformed).unwrap_err();
    assert!(matches!(err, TurnstileError::Codec(CodecError::Malformed(_))));

    let err = codec.load_str("{not json").unwrap_err();
    assert!(matches!(err, TurnstileError::Codec(CodecError::Malformed(_))));
}

#[tokio::test]
async fn tool_tasks_require_a_results_pause() {
    let confirmation = paused_run(false).await;
    let err = ToolTaskCodec::new().batch(&confirmation).unwrap_err();
    assert!(matches!(
        err,
        TurnstileError::Codec(CodecError::NotAwaitingToolResults(_))
    ));

    let deferred = paused_run(true).await;
    assert_eq!(deferred.pause_reason, PauseReason::AwaitingToolResults);
    let batch = ToolTaskCodec::new().batch(&deferred).unwrap();
    assert_eq!(batch.run_id, deferred.run_id);
    assert_eq!(batch.tasks.len(), 2);
    assert_eq!(batch.tasks[0].tool_call_id, "c1");
    assert_eq!(batch.tasks[0].arguments, json!({ "text": "rust" }));
    assert!(batch.context_attributes.is_empty());
    assert_eq!(batch.max_tool_output_bytes, deferred.max_tool_output_bytes);
}

#[tokio::test]
async fn tool_task_batches_reject_other_versions() {
    let deferred = paused_run(true).await;
    let codec = ToolTaskCodec::new();
    let mut wire = codec.dump(&deferred).unwrap();
    assert_eq!(codec.load(wire.clone()).unwrap(), codec.batch(&deferred).unwrap());

    wire["schema_version"] = json!("1");
    let err = codec.load(wire).unwrap_err();
    assert!(matches!(
        err,
        TurnstileError::Codec(CodecError::UnsupportedSchemaVersion { .. })
    ));
}
