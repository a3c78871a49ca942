use super::*;

#[tokio::test]
async fn streaming_run_forwards_every_provider_event() {
    let (tools, _, _) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::Greeting, tools);
    let (sink, events) = capture_events();
    let runner = runner.with_event_sink(sink);
    let mut seen = Vec::new();
    let mut on_event = |event: &StreamEvent| {
        seen.push(event.clone());
        Ok::<(), TurnstileError>(())
    };

    let result = completed(runner.run_streaming(user("hi"), &mut on_event).await.unwrap());

    assert_eq!(result.final_message.text(), "hello");
    assert_eq!(result.usage, Usage::new(10, 5));
    assert_eq!(seen.len(), 3);
    assert!(matches!(seen[0], StreamEvent::TextDelta { ref text } if text == "hello"));
    assert!(matches!(seen[2], StreamEvent::Done { .. }));
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(&e.payload, RunEventPayload::TextDelta { turn: 1, text } if text == "hello")));
}

#[tokio::test]
async fn streaming_and_sync_runs_agree() {
    let (tools, _, _) = lookup_and_delete();
    let (sync_runner, _) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let (tools, _, _) = lookup_and_delete();
    let (stream_runner, _) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let mut on_event = |_event: &StreamEvent| Ok::<(), TurnstileError>(());

    let sync = completed(sync_runner.run(user("go")).await.unwrap());
    let streamed = completed(stream_runner.run_streaming(user("go"), &mut on_event).await.unwrap());

    assert_eq!(sync.messages, streamed.messages);
    assert_eq!(sync.turns, streamed.turns);
    assert_eq!(sync.stop_reason, streamed.stop_reason);
}

#[tokio::test]
async fn callback_errors_abort_the_run() {
    let (tools, lookups, _) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let mut on_event =
        |_event: &StreamEvent| Err::<(), _>(TurnstileError::Stream("client disconnected".into()));

    let err = runner.run_streaming(user("go"), &mut on_event).await.unwrap_err();

    assert!(matches!(err, TurnstileError::Stream(_)));
    assert_eq!(lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn streaming_resume_continues_a_paused_run() {
    let (tools, _, deletes) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_policy(Arc::new(
        RulePolicy::new(DecisionOutcome::Allow).with_rule("delete", DecisionOutcome::Confirm),
    ));
    let mut deltas = String::new();
    let mut on_event = |event: &StreamEvent| {
        if let StreamEvent::TextDelta { text } = event {
            deltas.push_str(text);
        }
        Ok::<(), TurnstileError>(())
    };

    let continuation = paused(runner.run_streaming(user("go"), &mut on_event).await.unwrap());
    let result = completed(
        runner
            .resume_streaming(
                &continuation,
                [("c2".to_string(), ConfirmationDecision::Allow)],
                &mut on_event,
            )
            .await
            .unwrap(),
    );

    assert_eq!(deletes.load(Ordering::SeqCst), 1);
    assert_eq!(result.final_message.text(), "done");
    assert_eq!(deltas, "done");
}

#[tokio::test]
async fn streaming_tool_results_resume_continues_a_deferred_run() {
    let (tools, _, _) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_executor(Arc::new(DeferredExecutor));
    let mut on_event = |_event: &StreamEvent| Ok::<(), TurnstileError>(());

    let continuation = paused(runner.run_streaming(user("go"), &mut on_event).await.unwrap());
    let result = completed(
        runner
            .resume_with_tool_results_streaming(
                &continuation,
                vec![
                    ("c1".to_string(), ToolResult::text("found")),
                    ("c2".to_string(), ToolResult::text("deleted")),
                ],
                ResumeOptions::default(),
                &mut on_event,
            )
            .await
            .unwrap(),
    );
    assert_eq!(result.final_message.text(), "done");
}
