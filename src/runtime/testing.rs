//! Mock implementations for testing
//!
//! These mocks enable driving a call runtime without a real transport.

use super::traits::*;
use super::{start_call, CallHandle, Inbound, StateChange};
use crate::state_machine::{CallContext, CallSession, CallState, Event};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Recording Sink
// ============================================================================

/// Sink that records every delivered message
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Outbound>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later delivery fail as if the socket went away
    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Outbound> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn deliver(&self, message: Outbound) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        self.delivered.lock().unwrap().push(message);
        Ok(())
    }
}

// ============================================================================
// Test Call
// ============================================================================

/// A running call wired to a recording sink
pub struct TestCall {
    pub sink: Arc<RecordingSink>,
    pub handle: CallHandle,
    pub state_rx: broadcast::Receiver<StateChange>,
}

impl TestCall {
    /// Start a call whose transfer delay is short enough for tests
    pub fn start() -> Self {
        let mut context = CallContext::for_tests("test-call");
        context.transfer_delay = Duration::from_millis(50);
        Self::start_with(context)
    }

    pub fn start_with(context: CallContext) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let handle = start_call(context, sink.clone());
        let state_rx = handle.subscribe();
        Self {
            sink,
            handle,
            state_rx,
        }
    }

    /// Send a hook event that expects a reply
    pub async fn send_hook(&self, msgid: &str, event: Event) -> bool {
        self.handle.send(Inbound::hook(msgid, event)).await
    }

    pub async fn send_notification(&self, event: Event) -> bool {
        self.handle.send(Inbound::notification(event)).await
    }

    /// Wait until the call reaches `expected`
    pub async fn wait_for_state(&mut self, expected: CallState, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.state_rx.recv()).await {
                Ok(Ok(change)) if change.to == expected => return true,
                _ => continue,
            }
        }
        false
    }

    /// Drop the queue and wait for the runtime to hand back its session
    pub async fn finish(self) -> CallSession {
        let CallHandle { event_tx, task, .. } = self.handle;
        drop(event_tx);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("runtime did not stop")
            .expect("runtime panicked")
    }

    pub fn delivered(&self) -> Vec<Outbound> {
        self.sink.delivered()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SummaryDelivery;
    use crate::state_machine::event::{BackendError, CompletionEvent, DialOutcome, ToolCallEvent};
    use crate::state_machine::state::CloseReason;
    use crate::verbs::{ToolOutput, Verb};
    use serde_json::json;

    const WAIT: Duration = Duration::from_secs(2);

    fn session_new() -> Event {
        Event::SessionNew {
            call_sid: "test-call".to_string(),
        }
    }

    fn transfer(summary: &str) -> Event {
        Event::ToolCall(ToolCallEvent {
            name: "call-transfer".to_string(),
            args: json!({ "conversationSummary": summary }),
            tool_call_id: "abc".to_string(),
        })
    }

    fn verb_names(message: &Outbound) -> Vec<&'static str> {
        message.verbs().iter().map(Verb::name).collect()
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.deliver(Outbound::Redirect { verbs: vec![Verb::Hangup] })
            .await
            .unwrap();
        assert_eq!(sink.delivered().len(), 1);

        sink.fail_deliveries();
        assert!(matches!(
            sink.deliver(Outbound::Redirect { verbs: vec![] }).await,
            Err(SinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_session_start_replies_to_hook() {
        let mut call = TestCall::start();
        call.send_hook("m1", session_new()).await;
        assert!(call.wait_for_state(CallState::Conversing, WAIT).await);

        let delivered = call.delivered();
        assert_eq!(delivered.len(), 1);
        let Outbound::Ack { msgid, .. } = &delivered[0] else {
            panic!("expected ack, got {:?}", delivered[0]);
        };
        assert_eq!(msgid, "m1");
        assert_eq!(verb_names(&delivered[0]), ["answer", "pause", "llm", "hangup"]);
    }

    #[tokio::test]
    async fn test_transfer_flow_end_to_end() {
        let mut call = TestCall::start();
        call.send_hook("m1", session_new()).await;
        call.send_notification(transfer("billing help")).await;

        // Tool output goes out before the delayed redirect
        assert!(call.wait_for_state(CallState::TransferPending, WAIT).await);
        assert_eq!(
            call.delivered()[1],
            Outbound::ToolOutput {
                output: ToolOutput::success(
                    "abc",
                    "Successfully transferred call to agent, telling user to wait for a moment."
                )
            }
        );

        assert!(call.wait_for_state(CallState::Transferring, WAIT).await);
        let delivered = call.delivered();
        assert!(matches!(delivered[2], Outbound::Redirect { .. }));
        assert_eq!(verb_names(&delivered[2]), ["say", "dial"]);

        call.send_hook("m2", Event::DialConfirm).await;
        assert!(call.wait_for_state(CallState::TransferActive, WAIT).await);

        call.send_hook("m3", Event::DialAction(DialOutcome::default())).await;
        let session = call.finish().await;
        assert_eq!(session.close_reason, Some(CloseReason::AgentCallEnded));
    }

    #[tokio::test]
    async fn test_wrap_up_sequence_and_duplicate_dial_action() {
        let mut call = TestCall::start();
        call.send_hook("m1", session_new()).await;
        call.send_notification(transfer("billing help")).await;
        assert!(call.wait_for_state(CallState::Transferring, WAIT).await);
        call.send_hook("m2", Event::DialConfirm).await;
        call.send_hook("m3", Event::DialAction(DialOutcome::default())).await;
        call.send_hook("m4", Event::DialAction(DialOutcome::default())).await;
        assert!(call.wait_for_state(CallState::Closed, WAIT).await);

        let sink = call.sink.clone();
        call.finish().await;

        let delivered = sink.delivered();
        let wrap_ups: Vec<_> = delivered
            .iter()
            .filter(|m| m.verbs().first() == Some(&Verb::say("The call with a human agent has ended")))
            .collect();
        assert_eq!(wrap_ups.len(), 1);
        assert_eq!(
            *wrap_ups[0],
            Outbound::Ack {
                msgid: "m3".to_string(),
                verbs: vec![
                    Verb::say("The call with a human agent has ended"),
                    Verb::say("billing help"),
                    Verb::Hangup,
                ],
            }
        );
        // Nothing after the wrap-up
        assert_eq!(delivered.last(), Some(*wrap_ups.first().unwrap()));
    }

    #[tokio::test]
    async fn test_close_during_delay_never_dials() {
        let mut context = CallContext::for_tests("test-call");
        context.transfer_delay = Duration::from_millis(200);
        let mut call = TestCall::start_with(context);

        call.send_hook("m1", session_new()).await;
        call.send_notification(transfer("billing help")).await;
        assert!(call.wait_for_state(CallState::TransferPending, WAIT).await);
        call.send_notification(Event::Close {
            code: Some(1000),
            reason: "caller hung up".to_string(),
        })
        .await;
        assert!(call.wait_for_state(CallState::Closed, WAIT).await);

        // Outlast the delay
        tokio::time::sleep(Duration::from_millis(400)).await;
        let sink = call.sink.clone();
        let session = call.finish().await;

        assert!(!sink
            .delivered()
            .iter()
            .flat_map(|m| m.verbs().iter())
            .any(|v| matches!(v, Verb::Dial(_))));
        assert!(matches!(
            session.close_reason,
            Some(CloseReason::Transport { code: Some(1000), .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_completion() {
        let mut call = TestCall::start();
        call.send_hook("m1", session_new()).await;
        call.send_hook(
            "m2",
            Event::Completion(CompletionEvent {
                completion_reason: "server failure".to_string(),
                error: Some(BackendError {
                    code: Some("rate_limit_exceeded".to_string()),
                    message: Some("try again in 10 seconds".to_string()),
                }),
            }),
        )
        .await;
        assert!(call.wait_for_state(CallState::Closed, WAIT).await);

        assert_eq!(
            call.delivered()[1],
            Outbound::Ack {
                msgid: "m2".to_string(),
                verbs: vec![
                    Verb::say(
                        "Sorry, you have exceeded your rate limits. Please try again in 10 seconds."
                    ),
                    Verb::Hangup,
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_hook_still_acknowledged() {
        let mut call = TestCall::start();
        call.send_hook("m1", session_new()).await;
        assert!(call.wait_for_state(CallState::Conversing, WAIT).await);
        call.send_hook("m2", session_new()).await;
        call.send_notification(Event::Progress { data: json!({}) }).await;

        let sink = call.sink.clone();
        let session = call.finish().await;
        assert_eq!(session.state, CallState::Conversing);
        assert_eq!(
            sink.delivered(),
            vec![
                sink.delivered()[0].clone(),
                Outbound::Ack {
                    msgid: "m2".to_string(),
                    verbs: vec![]
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_summary_read_to_agent_on_confirm() {
        let mut context = CallContext::for_tests("test-call");
        context.transfer_delay = Duration::from_millis(10);
        context.summary_delivery = SummaryDelivery::Agent;
        let mut call = TestCall::start_with(context);

        call.send_hook("m1", session_new()).await;
        call.send_notification(transfer("billing help")).await;
        assert!(call.wait_for_state(CallState::Transferring, WAIT).await);
        call.send_hook("m2", Event::DialConfirm).await;
        assert!(call.wait_for_state(CallState::TransferActive, WAIT).await);

        let delivered = call.delivered();
        assert_eq!(
            delivered.last(),
            Some(&Outbound::Ack {
                msgid: "m2".to_string(),
                verbs: vec![
                    Verb::pause(1.0),
                    Verb::say("The summary of the call is."),
                    Verb::say("billing help"),
                ],
            })
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_closes_call() {
        let mut call = TestCall::start();
        call.sink.fail_deliveries();
        call.send_hook("m1", session_new()).await;
        assert!(call.wait_for_state(CallState::Closed, WAIT).await);

        let session = call.finish().await;
        assert!(matches!(
            session.close_reason,
            Some(CloseReason::TransportError { .. })
        ));
    }

    #[tokio::test]
    async fn test_runtime_stops_when_queue_dropped() {
        let call = TestCall::start();
        call.send_hook("m1", session_new()).await;
        let session = call.finish().await;
        assert_eq!(session.state, CallState::Conversing);
        assert!(session.close_reason.is_none());
    }
}
