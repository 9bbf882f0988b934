//! Pure state transition function
//!
//! Given the same session, context and event this always produces the same
//! next session and effects, with no I/O.

use super::classify::classify_completion;
use super::escalation;
use super::state::{CallContext, CallSession, CallState, CloseReason, ToolKind};
use super::{Effect, Event};
use crate::verbs::{LlmVerb, ToolOutput, Verb};
use thiserror::Error;

/// Seconds of silence between answering and starting the conversation
const ANSWER_PAUSE_SECS: f64 = 1.5;

const CONVERSATION_UNAVAILABLE: &str =
    "Sorry, we are unable to take your call right now. Please try again later.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: CallSession,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: CallSession) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Session not started, cannot handle {0}")]
    NotStarted(&'static str),
}

/// Pure transition function
pub fn transition(
    session: &CallSession,
    context: &CallContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    // Nothing leaves a closed call
    if session.is_closed() {
        return Ok(TransitionResult::new(session.clone()));
    }

    match (session.state, event) {
        // ============================================================
        // Session start
        // ============================================================
        (CallState::Initiated, Event::SessionNew { .. }) => Ok(start_session(session, context)),

        (_, Event::SessionNew { .. }) => Err(TransitionError::AlreadyStarted),

        // ============================================================
        // Transport
        // ============================================================
        (_, Event::Close { code, reason }) => Ok(close(
            session,
            CloseReason::Transport { code, reason },
        )),

        (_, Event::TransportError { message }) => Ok(close(
            session,
            CloseReason::TransportError { message },
        )),

        (CallState::Initiated, event) => Err(TransitionError::NotStarted(event.name())),

        // ============================================================
        // Conversation
        // ============================================================
        (_, Event::Progress { .. }) => Ok(TransitionResult::new(session.clone())),

        (CallState::Conversing, Event::Completion(completion)) => {
            match classify_completion(&completion) {
                Some(classification) => {
                    let code = completion.error.and_then(|e| e.code);
                    Ok(
                        TransitionResult::new(
                            session.clone().close(CloseReason::BackendFailure { code }),
                        )
                        .with_effect(Effect::reply(classification.into_verbs())),
                    )
                }
                // The hangup queued behind the conversation ends the call
                None => Ok(TransitionResult::new(
                    session.clone().advance(CallState::WrappingUp),
                )
                .with_effect(Effect::ack())),
            }
        }

        // Completion of the torn-down conversation during an escalation
        (_, Event::Completion(_)) => {
            Ok(TransitionResult::new(session.clone()).with_effect(Effect::ack()))
        }

        (_, Event::ToolCall(call)) => Ok(match ToolKind::from_name(&call.name) {
            Some(ToolKind::Transfer) => escalation::begin_transfer(session, context, call),
            None => {
                let message = format!("Unknown tool: {}", call.name);
                TransitionResult::new(session.clone())
                    .with_effect(Effect::tool_output(ToolOutput::error(
                        call.tool_call_id,
                        message,
                    )))
            }
        }),

        (_, Event::InvalidToolCall {
            tool_call_id,
            reason,
        }) => Ok(TransitionResult::new(session.clone()).with_effect(Effect::tool_output(
            ToolOutput::error(tool_call_id, format!("Invalid tool call: {reason}")),
        ))),

        // ============================================================
        // Escalation
        // ============================================================
        (_, Event::RedirectDue) => Ok(escalation::redirect_due(session, context)),

        (_, Event::DialConfirm) => Ok(escalation::on_confirmed(session, context)),

        (_, Event::DialAction(outcome)) => {
            Ok(escalation::on_completed(session, context, &outcome))
        }
    }
}

/// Answer, then hand the call to the conversational backend. The trailing
/// hangup runs if the conversation ends without a redirect.
fn start_session(session: &CallSession, context: &CallContext) -> TransitionResult {
    let Some(api_key) = &context.conversation.api_key else {
        return TransitionResult::new(
            session.clone().close(CloseReason::ConversationUnavailable),
        )
        .with_effect(Effect::reply(vec![
            Verb::Answer,
            Verb::say(CONVERSATION_UNAVAILABLE),
            Verb::Hangup,
        ]));
    };

    TransitionResult::new(session.clone().advance(CallState::Conversing)).with_effect(
        Effect::reply(vec![
            Verb::Answer,
            Verb::pause(ANSWER_PAUSE_SECS),
            Verb::Llm(LlmVerb::conversation(&context.conversation, api_key)),
            Verb::Hangup,
        ]),
    )
}

fn close(session: &CallSession, reason: CloseReason) -> TransitionResult {
    let mut result = TransitionResult::new(session.clone().close(reason));
    if session.state == CallState::TransferPending {
        result = result.with_effect(Effect::CancelRedirect);
    }
    result
}
