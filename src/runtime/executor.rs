//! Call runtime executor

use super::traits::{CommandSink, Outbound, SinkError};
use super::StateChange;
use crate::state_machine::{transition, CallContext, CallSession, Effect, Event};
use crate::verbs::Verb;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// An event queued for a call, with the id of the hook message to reply to
#[derive(Debug, Clone)]
pub struct Inbound {
    pub msgid: Option<String>,
    pub event: Event,
}

impl Inbound {
    /// Event that expects a reply
    pub fn hook(msgid: impl Into<String>, event: Event) -> Self {
        Self {
            msgid: Some(msgid.into()),
            event,
        }
    }

    /// Event that expects no reply
    pub fn notification(event: Event) -> Self {
        Self { msgid: None, event }
    }
}

/// Drives one call: applies events to the state machine in arrival order
/// and carries out the resulting effects
pub struct CallRuntime<K>
where
    K: CommandSink + 'static,
{
    context: CallContext,
    session: CallSession,
    sink: Arc<K>,
    event_rx: mpsc::Receiver<Inbound>,
    /// Weak so the queue closes once the transport lets go of it
    event_tx: mpsc::WeakSender<Inbound>,
    state_tx: broadcast::Sender<StateChange>,
    /// Token to cancel the scheduled transfer redirect
    redirect_cancel: Option<CancellationToken>,
}

impl<K> CallRuntime<K>
where
    K: CommandSink + 'static,
{
    pub fn new(
        context: CallContext,
        sink: Arc<K>,
        event_rx: mpsc::Receiver<Inbound>,
        event_tx: &mpsc::Sender<Inbound>,
        state_tx: broadcast::Sender<StateChange>,
    ) -> Self {
        let session = CallSession::new(context.call_sid.clone());
        Self {
            context,
            session,
            sink,
            event_rx,
            event_tx: event_tx.downgrade(),
            state_tx,
            redirect_cancel: None,
        }
    }

    pub async fn run(mut self) -> CallSession {
        tracing::info!(call_sid = %self.context.call_sid, "Starting call runtime");

        // One event at a time; stop listening once the call is closed
        while let Some(inbound) = self.event_rx.recv().await {
            self.process_event(inbound).await;
            if self.session.is_closed() {
                break;
            }
        }

        self.cancel_redirect();

        let duration = chrono::Utc::now() - self.session.started_at;
        tracing::info!(
            call_sid = %self.context.call_sid,
            state = ?self.session.state,
            close_reason = ?self.session.close_reason,
            duration_secs = duration.num_seconds(),
            "Call runtime stopped"
        );
        self.session
    }

    async fn process_event(&mut self, inbound: Inbound) {
        // Delivery failures feed a transport error back through the machine
        let mut queue = VecDeque::from([inbound]);

        while let Some(Inbound { msgid, event }) = queue.pop_front() {
            if self.session.is_closed() {
                tracing::debug!(
                    call_sid = %self.context.call_sid,
                    event = event.name(),
                    "Ignoring event for closed call"
                );
                continue;
            }

            let event_name = event.name();
            match &event {
                Event::SessionNew { call_sid } => {
                    tracing::debug!(call_sid = %call_sid, "Session start requested");
                }
                Event::Progress { data } => {
                    tracing::debug!(
                        call_sid = %self.context.call_sid,
                        progress_type = data["type"].as_str().unwrap_or("unknown"),
                        %data,
                        "Conversation progress"
                    );
                }
                Event::DialAction(outcome) => {
                    tracing::info!(
                        call_sid = %self.context.call_sid,
                        connected = outcome.connected(),
                        dial_call_status = ?outcome.dial_call_status,
                        dial_sip_status = ?outcome.dial_sip_status,
                        duration_secs = ?outcome.duration,
                        "Agent call ended"
                    );
                }
                _ => {}
            }

            let result = match transition(&self.session, &self.context, event) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        call_sid = %self.context.call_sid,
                        event = event_name,
                        state = ?self.session.state,
                        error = %e,
                        "Rejected call event"
                    );
                    if let Some(msgid) = msgid {
                        if let Err(e) = self.deliver(Outbound::Ack { msgid, verbs: vec![] }).await {
                            queue.push_back(transport_failure(&e));
                        }
                    }
                    continue;
                }
            };

            let old_state = self.session.state;
            self.session = result.session;

            if old_state == self.session.state {
                tracing::debug!(
                    call_sid = %self.context.call_sid,
                    event = event_name,
                    state = ?old_state,
                    "Event handled without state change"
                );
            } else {
                tracing::info!(
                    call_sid = %self.context.call_sid,
                    event = event_name,
                    from = ?old_state,
                    to = ?self.session.state,
                    "Call state changed"
                );
            }

            let mut replied = false;
            for effect in result.effects {
                replied |= matches!(effect, Effect::Reply { .. });
                if let Err(e) = self.execute_effect(effect, msgid.as_deref()).await {
                    queue.push_back(transport_failure(&e));
                    break;
                }
            }

            // Hooks always get an answer while the call is open
            if let (false, Some(msgid)) = (replied, msgid) {
                if !self.session.is_closed() {
                    if let Err(e) = self.deliver(Outbound::Ack { msgid, verbs: vec![] }).await {
                        queue.push_back(transport_failure(&e));
                    }
                }
            }

            // Observers see a state only once its effects have gone out
            if old_state != self.session.state {
                let _ = self.state_tx.send(StateChange {
                    from: old_state,
                    to: self.session.state,
                });
            }
        }
    }

    /// Execute an effect against the sink or the redirect timer
    async fn execute_effect(&mut self, effect: Effect, msgid: Option<&str>) -> Result<(), SinkError> {
        match effect {
            Effect::Reply { verbs } => match msgid {
                Some(msgid) => {
                    self.deliver(Outbound::Ack {
                        msgid: msgid.to_string(),
                        verbs,
                    })
                    .await
                }
                None if verbs.is_empty() => Ok(()),
                None => {
                    // Nothing to reply to; the verbs still have to run
                    tracing::warn!(
                        call_sid = %self.context.call_sid,
                        "Reply without a hook message, sending as redirect"
                    );
                    self.deliver(Outbound::Redirect { verbs }).await
                }
            },

            Effect::Redirect { verbs } => self.deliver(Outbound::Redirect { verbs }).await,

            Effect::ToolOutput { output } => {
                tracing::info!(
                    call_sid = %self.context.call_sid,
                    tool_call_id = %output.invocation_id,
                    is_error = output.is_error(),
                    "Answering tool call"
                );
                self.deliver(Outbound::ToolOutput { output }).await
            }

            Effect::ScheduleRedirect { delay } => {
                self.schedule_redirect(delay);
                Ok(())
            }

            Effect::CancelRedirect => {
                tracing::info!(call_sid = %self.context.call_sid, "Cancelling scheduled transfer");
                self.cancel_redirect();
                Ok(())
            }
        }
    }

    fn schedule_redirect(&mut self, delay: Duration) {
        let Some(event_tx) = self.event_tx.upgrade() else {
            tracing::warn!(call_sid = %self.context.call_sid, "Event queue closed, transfer not scheduled");
            return;
        };

        // Replaces any earlier timer
        self.cancel_redirect();
        let cancel_token = CancellationToken::new();
        self.redirect_cancel = Some(cancel_token.clone());
        let call_sid = self.context.call_sid.clone();

        tracing::info!(call_sid = %call_sid, delay_ms = delay.as_millis(), "Scheduling transfer redirect");

        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    if cancel_token.is_cancelled() {
                        return;
                    }
                    let _ = event_tx.send(Inbound::notification(Event::RedirectDue)).await;
                }
                () = cancel_token.cancelled() => {
                    tracing::debug!(call_sid = %call_sid, "Transfer redirect cancelled");
                }
            }
        });
    }

    fn cancel_redirect(&mut self) {
        if let Some(token) = self.redirect_cancel.take() {
            token.cancel();
        }
    }

    async fn deliver(&self, message: Outbound) -> Result<(), SinkError> {
        let verbs: Vec<&str> = message.verbs().iter().map(Verb::name).collect();
        tracing::debug!(call_sid = %self.context.call_sid, ?verbs, "Sending call commands");

        self.sink.deliver(message).await.inspect_err(|e| {
            tracing::error!(call_sid = %self.context.call_sid, error = %e, "Failed to deliver call commands");
        })
    }
}

fn transport_failure(error: &SinkError) -> Inbound {
    Inbound::notification(Event::TransportError {
        message: error.to_string(),
    })
}
