//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::event::{BackendError, CompletionEvent, DialOutcome, ToolCallEvent};
use super::state::*;
use super::transition::TransitionResult;
use super::*;
use crate::config::SummaryDelivery;
use crate::verbs::Verb;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_completion() -> impl Strategy<Value = CompletionEvent> {
    (
        prop_oneof![
            Just("server failure".to_string()),
            Just("server error".to_string()),
            Just("normal conversation end".to_string()),
            "[a-z ]{0,20}",
        ],
        proptest::option::of((
            proptest::option::of(prop_oneof![
                Just("rate_limit_exceeded".to_string()),
                "[a-z_]{1,12}",
            ]),
            proptest::option::of("[a-z ]{0,10}( try again in [0-9]{1,3} seconds)?"),
        )),
    )
        .prop_map(|(completion_reason, error)| CompletionEvent {
            completion_reason,
            error: error.map(|(code, message)| BackendError { code, message }),
        })
}

fn arb_tool_call() -> impl Strategy<Value = ToolCallEvent> {
    (
        prop_oneof![
            3 => Just("call-transfer".to_string()),
            1 => "[a-z]{3,8}",
        ],
        proptest::option::of("[a-zA-Z ]{0,30}"),
        "[a-z0-9]{6}",
    )
        .prop_map(|(name, summary, tool_call_id)| ToolCallEvent {
            name,
            args: summary.map_or(json!({}), |s| json!({ "conversationSummary": s })),
            tool_call_id,
        })
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::SessionNew {
            call_sid: "call-1".to_string()
        }),
        Just(Event::Progress { data: json!({}) }),
        arb_completion().prop_map(Event::Completion),
        arb_tool_call().prop_map(Event::ToolCall),
        "[a-z0-9]{6}".prop_map(|tool_call_id| Event::InvalidToolCall {
            tool_call_id,
            reason: "missing field `name`".to_string(),
        }),
        Just(Event::RedirectDue),
        Just(Event::DialConfirm),
        proptest::option::of("[a-z-]{4,10}").prop_map(|status| Event::DialAction(DialOutcome {
            dial_call_status: status,
            ..DialOutcome::default()
        })),
        (proptest::option::of(1000u16..1015), "[a-z ]{0,10}")
            .prop_map(|(code, reason)| Event::Close { code, reason }),
        "[a-z ]{0,10}".prop_map(|message| Event::TransportError { message }),
    ]
}

fn arb_context() -> impl Strategy<Value = CallContext> {
    (
        any::<bool>(),
        any::<bool>(),
        prop_oneof![
            Just(SummaryDelivery::Caller),
            Just(SummaryDelivery::Agent),
            Just(SummaryDelivery::Off),
        ],
    )
        .prop_map(|(has_agent, use_confirm_hook, summary_delivery)| {
            let mut context = CallContext::for_tests("call-1");
            if !has_agent {
                context.agent = None;
            }
            context.use_confirm_hook = use_confirm_hook;
            context.summary_delivery = summary_delivery;
            context
        })
}

/// Run a sequence of events, collecting every transition result
fn run(context: &CallContext, events: Vec<Event>) -> Vec<(CallSession, Event, TransitionResult)> {
    let mut session = CallSession::new("call-1");
    let mut steps = Vec::new();
    for event in events {
        if let Ok(result) = transition(&session, context, event.clone()) {
            let before = std::mem::replace(&mut session, result.session.clone());
            steps.push((before, event, result));
        }
    }
    steps
}

/// Most sequences should actually get the call going
fn started(events: Vec<Event>) -> Vec<Event> {
    let mut all = vec![Event::SessionNew {
        call_sid: "call-1".to_string(),
    }];
    all.extend(events);
    all
}

proptest! {
    // Invariant 1: state never moves backwards
    #[test]
    fn prop_state_is_monotonic(
        context in arb_context(),
        events in proptest::collection::vec(arb_event(), 0..30)
    ) {
        for (before, event, result) in run(&context, started(events)) {
            prop_assert!(
                result.session.state.rank() >= before.state.rank(),
                "{:?} -> {:?} on {}",
                before.state,
                result.session.state,
                event.name()
            );
        }
    }

    // Invariant 2: nothing is emitted for, and nothing changes in, a closed call
    #[test]
    fn prop_closed_is_final(
        context in arb_context(),
        events in proptest::collection::vec(arb_event(), 0..30)
    ) {
        for (before, _, result) in run(&context, started(events)) {
            if before.is_closed() {
                prop_assert!(result.effects.is_empty());
                prop_assert_eq!(&result.session, &before);
            }
        }
    }

    // Invariant 3: at most one conversation is ever started
    #[test]
    fn prop_single_conversation(
        context in arb_context(),
        events in proptest::collection::vec(arb_event(), 0..30)
    ) {
        let conversations = run(&context, started(events))
            .iter()
            .flat_map(|(_, _, result)| result.effects.iter())
            .flat_map(Effect::verbs)
            .filter(|verb| matches!(verb, Verb::Llm(_)))
            .count();
        prop_assert!(conversations <= 1);
    }

    // Invariant 4: every tool call on an open session gets exactly one reply,
    // ahead of anything else the transition emits
    #[test]
    fn prop_tool_calls_always_answered(
        context in arb_context(),
        events in proptest::collection::vec(arb_event(), 0..30)
    ) {
        for (before, event, result) in run(&context, started(events)) {
            let tool_call_id = match event {
                Event::ToolCall(call) => call.tool_call_id,
                Event::InvalidToolCall { tool_call_id, .. } => tool_call_id,
                _ => continue,
            };
            if before.is_closed() {
                continue;
            }
            let outputs: Vec<_> = result
                .effects
                .iter()
                .filter_map(|e| match e {
                    Effect::ToolOutput { output } => Some(output),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(outputs.len(), 1);
            prop_assert_eq!(&outputs[0].invocation_id, &tool_call_id);
            prop_assert!(
                matches!(result.effects[0], Effect::ToolOutput { .. }),
                "tool output must be the first effect"
            );
        }
    }

    // Invariant 5: close reason is present exactly when closed, and never rewritten
    #[test]
    fn prop_close_reason_set_once(
        context in arb_context(),
        events in proptest::collection::vec(arb_event(), 0..30)
    ) {
        for (before, _, result) in run(&context, started(events)) {
            prop_assert_eq!(result.session.is_closed(), result.session.close_reason.is_some());
            if before.close_reason.is_some() {
                prop_assert_eq!(&before.close_reason, &result.session.close_reason);
            }
        }
    }

    // Invariant 6: at most one escalation is in flight
    #[test]
    fn prop_single_redirect_scheduled(
        context in arb_context(),
        events in proptest::collection::vec(arb_event(), 0..30)
    ) {
        let scheduled = run(&context, started(events))
            .iter()
            .flat_map(|(_, _, result)| result.effects.iter())
            .filter(|e| matches!(e, Effect::ScheduleRedirect { .. }))
            .count();
        prop_assert!(scheduled <= 1);
    }

    // Invariant 7: the agent is only dialled from TransferPending, after the delay
    #[test]
    fn prop_dial_only_after_redirect_due(
        context in arb_context(),
        events in proptest::collection::vec(arb_event(), 0..30)
    ) {
        for (before, event, result) in run(&context, started(events)) {
            let dials = result
                .effects
                .iter()
                .flat_map(Effect::verbs)
                .filter(|verb| matches!(verb, Verb::Dial(_)))
                .count();
            if dials > 0 {
                prop_assert!(matches!(event, Event::RedirectDue));
                prop_assert_eq!(before.state, CallState::TransferPending);
                prop_assert_eq!(dials, 1);
            }
        }
    }
}

// ============================================================================
// Scenario tests
// ============================================================================

#[test]
fn test_wrap_up_emitted_once_for_duplicate_dial_actions() {
    let context = CallContext::for_tests("call-1");
    let steps = run(
        &context,
        started(vec![
            Event::ToolCall(ToolCallEvent {
                name: "call-transfer".to_string(),
                args: json!({ "conversationSummary": "billing help" }),
                tool_call_id: "abc".to_string(),
            }),
            Event::RedirectDue,
            Event::DialConfirm,
            Event::DialAction(DialOutcome::default()),
            Event::DialAction(DialOutcome::default()),
            Event::DialConfirm,
        ]),
    );

    let hangups = steps
        .iter()
        .flat_map(|(_, _, result)| result.effects.iter())
        .flat_map(Effect::verbs)
        .filter(|verb| matches!(verb, Verb::Hangup))
        .count();
    // One queued behind the conversation at start, one in the wrap-up
    assert_eq!(hangups, 2);
    assert!(steps.last().unwrap().2.session.is_closed());
}

#[test]
fn test_close_in_delay_window_never_dials() {
    let context = CallContext::for_tests("call-1");
    let steps = run(
        &context,
        started(vec![
            Event::ToolCall(ToolCallEvent {
                name: "call-transfer".to_string(),
                args: json!({}),
                tool_call_id: "abc".to_string(),
            }),
            Event::Close {
                code: Some(1000),
                reason: "caller hung up".to_string(),
            },
            Event::RedirectDue,
        ]),
    );

    assert!(!steps
        .iter()
        .flat_map(|(_, _, result)| result.effects.iter())
        .flat_map(Effect::verbs)
        .any(|verb| matches!(verb, Verb::Dial(_))));
}
