//! Hand-off of a call to a human agent
//!
//! The escalation spans a delay and up to two dial hooks, so it is kept
//! apart from the conversational turn logic. Each step is a pure function
//! of the session, in the same shape as [`transition`](super::transition).
//!
//! ```text
//! Conversing --tool call--> TransferPending --delay--> Transferring
//!     --confirm--> TransferActive --dial action--> Closed
//!                  Transferring   --dial action--> Closed
//! ```

use super::event::{DialOutcome, ToolCallEvent};
use super::state::{CallContext, CallSession, CallState, CloseReason, PendingToolCall, ToolKind};
use super::transition::TransitionResult;
use super::Effect;
use crate::config::SummaryDelivery;
use crate::verbs::{DialVerb, ToolOutput, Verb};

pub const TRANSFER_ACCEPTED: &str =
    "Successfully transferred call to agent, telling user to wait for a moment.";
pub const TRANSFER_FAILED: &str = "Failed to transfer call";
pub const TRANSFER_IN_PROGRESS: &str = "A transfer is already in progress";
pub const PLEASE_WAIT: &str = "Please wait while I connect your call";
pub const TRANSFER_UNAVAILABLE: &str =
    "Sorry, I am unable to transfer your call right now. Please call back later.";
pub const AGENT_CALL_ENDED: &str = "The call with a human agent has ended";
pub const SUMMARY_INTRO: &str = "The summary of the call is.";

/// Acknowledge the transfer tool call and schedule the redirect.
///
/// The tool output is always the first effect: the backend waits on it.
pub(super) fn begin_transfer(
    session: &CallSession,
    context: &CallContext,
    call: ToolCallEvent,
) -> TransitionResult {
    if session.state != CallState::Conversing || session.pending_tool.is_some() {
        return TransitionResult::new(session.clone()).with_effect(Effect::tool_output(
            ToolOutput::error(call.tool_call_id, TRANSFER_IN_PROGRESS),
        ));
    }

    if context.agent.is_none() {
        return TransitionResult::new(session.clone().close(CloseReason::TransferUnavailable))
            .with_effect(Effect::tool_output(ToolOutput::error(
                call.tool_call_id,
                TRANSFER_FAILED,
            )))
            .with_effect(Effect::redirect(vec![
                Verb::say(TRANSFER_UNAVAILABLE),
                Verb::Hangup,
            ]));
    }

    let mut next = session.clone().advance(CallState::TransferPending);
    if let Some(summary) = call.summary() {
        next.conversation_summary = Some(summary);
    }
    next.pending_tool = Some(PendingToolCall {
        id: call.tool_call_id.clone(),
        kind: ToolKind::Transfer,
    });

    TransitionResult::new(next)
        .with_effect(Effect::tool_output(ToolOutput::success(
            call.tool_call_id,
            TRANSFER_ACCEPTED,
        )))
        .with_effect(Effect::ScheduleRedirect {
            delay: context.transfer_delay,
        })
}

/// The transfer delay elapsed: tell the caller to hold and dial the agent
pub(super) fn redirect_due(session: &CallSession, context: &CallContext) -> TransitionResult {
    if session.state != CallState::TransferPending {
        // Cancelled or superseded
        return TransitionResult::new(session.clone());
    }

    let Some(agent) = &context.agent else {
        return TransitionResult::new(session.clone().close(CloseReason::TransferUnavailable))
            .with_effect(Effect::redirect(vec![
                Verb::say(TRANSFER_UNAVAILABLE),
                Verb::Hangup,
            ]));
    };

    let mut next = session.clone().advance(CallState::Transferring);
    next.pending_tool = None;

    TransitionResult::new(next).with_effect(Effect::redirect(vec![
        Verb::say(PLEASE_WAIT),
        Verb::Dial(DialVerb::to_agent(agent, context.use_confirm_hook)),
    ]))
}

/// The agent answered
pub(super) fn on_confirmed(session: &CallSession, context: &CallContext) -> TransitionResult {
    if session.state != CallState::Transferring {
        // Duplicate or late confirmation
        return TransitionResult::new(session.clone()).with_effect(Effect::ack());
    }

    let verbs = match (&session.conversation_summary, context.summary_delivery) {
        (Some(summary), SummaryDelivery::Agent) => vec![
            Verb::pause(1.0),
            Verb::say(SUMMARY_INTRO),
            Verb::say(summary.clone()),
        ],
        _ => vec![],
    };

    TransitionResult::new(session.clone().advance(CallState::TransferActive))
        .with_effect(Effect::reply(verbs))
}

/// The agent leg ended, whatever the outcome: wrap up and close.
/// Never retried.
pub(super) fn on_completed(
    session: &CallSession,
    context: &CallContext,
    _outcome: &DialOutcome,
) -> TransitionResult {
    if !matches!(
        session.state,
        CallState::Transferring | CallState::TransferActive
    ) {
        return TransitionResult::new(session.clone()).with_effect(Effect::ack());
    }

    let wrapping = session.clone().advance(CallState::WrappingUp);

    let mut verbs = vec![Verb::say(AGENT_CALL_ENDED)];
    if context.summary_delivery == SummaryDelivery::Caller {
        if let Some(summary) = &wrapping.conversation_summary {
            verbs.push(Verb::say(summary.clone()));
        }
    }
    verbs.push(Verb::Hangup);

    TransitionResult::new(wrapping.close(CloseReason::AgentCallEnded))
        .with_effect(Effect::reply(verbs))
}
