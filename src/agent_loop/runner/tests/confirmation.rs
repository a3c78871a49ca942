use super::*;

fn confirm_deletes() -> Arc<RulePolicy> {
    Arc::new(RulePolicy::new(DecisionOutcome::Allow).with_rule("delete", DecisionOutcome::Confirm))
}

#[tokio::test]
async fn confirm_decision_pauses_before_executing_anything() {
    let (tools, lookups, deletes) = lookup_and_delete();
    let (runner, requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_policy(confirm_deletes());

    let continuation = paused(runner.run(user("go")).await.unwrap());

    assert_eq!(continuation.pause_reason, PauseReason::AwaitingToolConfirmation);
    assert_eq!(continuation.pending_tool_call_ids(), vec!["c1", "c2"]);
    assert_eq!(
        continuation.pending_decisions["c1"].outcome(),
        DecisionOutcome::Allow
    );
    assert_eq!(
        continuation.pending_decisions["c2"].outcome(),
        DecisionOutcome::Confirm
    );
    assert!(continuation.pending_tool_executions.is_empty());
    assert_eq!(continuation.turn, 1);
    assert_eq!(continuation.messages.len(), 2);
    assert_eq!(lookups.load(Ordering::SeqCst), 0);
    assert_eq!(deletes.load(Ordering::SeqCst), 0);
    assert_eq!(request_count(&requests), 1);
    assert!(continuation.validate().is_ok());
}

#[tokio::test]
async fn approving_the_confirmation_runs_every_pending_call() {
    let (tools, lookups, deletes) = lookup_and_delete();
    let (runner, requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_policy(confirm_deletes());
    let continuation = paused(runner.run(user("go")).await.unwrap());

    let (sink, events) = capture_events();
    let runner = runner.with_event_sink(sink);
    let outcome = runner
        .resume(&continuation, [("c2".to_string(), ConfirmationDecision::Allow)])
        .await
        .unwrap();
    let result = completed(outcome);

    assert_eq!(result.final_message.text(), "done");
    assert_eq!(result.turns, 2);
    assert_eq!(result.run_id, continuation.run_id);
    assert_eq!(lookups.load(Ordering::SeqCst), 1);
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
    assert_eq!(request_count(&requests), 2);

    let first_turn = &result.trace.turn_traces[0];
    assert_eq!(first_turn.confirmations.len(), 1);
    assert!(first_turn.confirmations[0].allowed);
    assert_eq!(first_turn.executions.len(), 2);
    assert!(matches!(
        events.lock().unwrap().first().map(|e| &e.payload),
        Some(RunEventPayload::RunStarted { resumed: true, .. })
    ));
}

#[tokio::test]
async fn denying_the_confirmation_feeds_back_the_reason() {
    let (tools, lookups, deletes) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_policy(confirm_deletes());
    let continuation = paused(runner.run(user("go")).await.unwrap());

    let result = completed(
        runner
            .resume(
                &continuation,
                [("c2".to_string(), ConfirmationDecision::deny("not now"))],
            )
            .await
            .unwrap(),
    );

    assert_eq!(lookups.load(Ordering::SeqCst), 1);
    assert_eq!(deletes.load(Ordering::SeqCst), 0);
    let results = tool_result_messages(&result.messages);
    assert_eq!(results[0].text(), "lookup ok");
    assert_eq!(results[1].text(), "Tool call denied: not now");
    assert!(results[1].is_error);
}

#[tokio::test]
async fn allowed_calls_can_be_overridden_on_resume() {
    let (tools, lookups, _) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_policy(confirm_deletes());
    let continuation = paused(runner.run(user("go")).await.unwrap());

    let decisions = vec![
        ("c1".to_string(), ConfirmationDecision::Deny { reason: None }),
        ("c2".to_string(), ConfirmationDecision::Allow),
    ];
    let result = completed(runner.resume(&continuation, decisions).await.unwrap());

    assert_eq!(lookups.load(Ordering::SeqCst), 0);
    let results = tool_result_messages(&result.messages);
    assert_eq!(results[0].text(), "Tool call denied: denied by user");
}

#[tokio::test]
async fn policy_denials_stay_buffered_across_the_pause() {
    let (tools, lookups, deletes) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let policy = RulePolicy::new(DecisionOutcome::Deny).with_rule("delete", DecisionOutcome::Confirm);
    let runner = runner.with_policy(Arc::new(policy));

    let continuation = paused(runner.run(user("go")).await.unwrap());
    assert_eq!(continuation.pending_tool_call_ids(), vec!["c2"]);
    assert!(continuation.buffered_tool_results.contains_key("c1"));

    let result = completed(
        runner
            .resume(&continuation, [("c2".to_string(), ConfirmationDecision::Allow)])
            .await
            .unwrap(),
    );
    assert_eq!(lookups.load(Ordering::SeqCst), 0);
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
    let results = tool_result_messages(&result.messages);
    assert_eq!(results[0].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(results[0].text(), "Tool call denied: tool 'lookup' is denied by policy");
    assert_eq!(results[1].text(), "delete ok");
}

#[tokio::test]
async fn invalid_confirmation_input_is_rejected_and_the_continuation_stays_usable() {
    let (tools, _, deletes) = lookup_and_delete();
    let (runner, requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_policy(confirm_deletes());
    let continuation = paused(runner.run(user("go")).await.unwrap());

    let missing = runner
        .resume(&continuation, Vec::<(String, ConfirmationDecision)>::new())
        .await
        .unwrap_err();
    assert!(matches!(
        missing,
        TurnstileError::Resume(ResumeError::MissingConfirmations(ref ids)) if ids == &vec!["c2".to_string()]
    ));

    let unexpected = runner
        .resume(
            &continuation,
            [
                ("c2".to_string(), ConfirmationDecision::Allow),
                ("zz".to_string(), ConfirmationDecision::Allow),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        unexpected,
        TurnstileError::Resume(ResumeError::UnexpectedConfirmations(ref ids)) if ids == &vec!["zz".to_string()]
    ));

    let duplicate = runner
        .resume(
            &continuation,
            [
                ("c2".to_string(), ConfirmationDecision::Allow),
                ("c2".to_string(), ConfirmationDecision::deny("changed my mind")),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        duplicate,
        TurnstileError::Resume(ResumeError::DuplicateConfirmation(ref id)) if id == "c2"
    ));

    let wrong_mode = runner
        .resume_with_tool_results(
            &continuation,
            [("c2".to_string(), ToolResult::text("x"))],
            ResumeOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        wrong_mode,
        TurnstileError::Resume(ResumeError::PauseReasonMismatch { .. })
    ));

    assert_eq!(deletes.load(Ordering::SeqCst), 0);
    assert_eq!(request_count(&requests), 1);

    let result = completed(
        runner
            .resume(&continuation, [("c2".to_string(), ConfirmationDecision::Allow)])
            .await
            .unwrap(),
    );
    assert_eq!(result.final_message.text(), "done");
}

#[tokio::test]
async fn corrupted_continuations_are_refused() {
    let (tools, _, _) = lookup_and_delete();
    let (runner, _requests) = test_runner(ProviderScenario::LookupAndDeleteThenDone, tools);
    let runner = runner.with_policy(confirm_deletes());
    let mut continuation = paused(runner.run(user("go")).await.unwrap());
    continuation.pending_decisions.clear();

    let err = runner
        .resume(&continuation, [("c2".to_string(), ConfirmationDecision::Allow)])
        .await
        .unwrap_err();
    assert!(matches!(err, TurnstileError::Codec(_)));
}
