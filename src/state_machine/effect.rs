//! Effects produced by state transitions

use crate::verbs::{ToolOutput, Verb};
use std::time::Duration;

/// Effects to be executed after state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Answer the hook currently being processed. An empty list is a bare
    /// acknowledgement.
    Reply { verbs: Vec<Verb> },

    /// Replace whatever the call is executing with `verbs`
    Redirect { verbs: Vec<Verb> },

    /// Return a result to the backend for one tool invocation
    ToolOutput { output: ToolOutput },

    /// Raise `Event::RedirectDue` after `delay`
    ScheduleRedirect { delay: Duration },

    /// Drop a scheduled redirect that has not fired yet
    CancelRedirect,
}

impl Effect {
    pub fn reply(verbs: Vec<Verb>) -> Self {
        Effect::Reply { verbs }
    }

    pub fn ack() -> Self {
        Effect::Reply { verbs: vec![] }
    }

    pub fn redirect(verbs: Vec<Verb>) -> Self {
        Effect::Redirect { verbs }
    }

    pub fn tool_output(output: ToolOutput) -> Self {
        Effect::ToolOutput { output }
    }

    /// Verbs this effect sends to the call, if any
    #[cfg(test)]
    pub fn verbs(&self) -> &[Verb] {
        match self {
            Effect::Reply { verbs } | Effect::Redirect { verbs } => verbs,
            _ => &[],
        }
    }
}
