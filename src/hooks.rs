//! Hook paths and routing of hook notifications to session events
//!
//! Every hook this service binds into an outbound verb has a [`HookKind`].
//! Notifications arrive tagged with the hook path; [`route`] turns a path
//! and its JSON payload into a typed [`Event`] for the call's state machine.

use crate::state_machine::event::{CompletionEvent, DialOutcome, ToolCallEvent};
use crate::state_machine::Event;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// `llm` verb ended (`actionHook`)
    Completion,
    /// Informational backend event (`eventHook`)
    Progress,
    /// Backend requests a tool invocation (`toolHook`)
    ToolCall,
    /// Agent dial leg ended (`dial` `actionHook`)
    DialAction,
    /// Agent answered (`dial` `confirmHook`)
    DialConfirm,
}

impl HookKind {
    pub const ALL: [HookKind; 5] = [
        HookKind::Completion,
        HookKind::Progress,
        HookKind::ToolCall,
        HookKind::DialAction,
        HookKind::DialConfirm,
    ];

    pub fn path(self) -> &'static str {
        match self {
            HookKind::Completion => "/final",
            HookKind::Progress => "/event",
            HookKind::ToolCall => "/toolCall",
            HookKind::DialAction => "/dialAction",
            HookKind::DialConfirm => "/confirmAction",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.path() == path)
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("no handler bound for hook {0}")]
    UnknownHook(String),
    #[error("malformed payload for hook {hook}: {source}")]
    Payload {
        hook: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Demultiplex a hook notification into a session event
pub fn route(hook: &str, data: Value) -> Result<Event, HookError> {
    let kind = HookKind::from_path(hook).ok_or_else(|| HookError::UnknownHook(hook.to_string()))?;
    let payload_error = |source| HookError::Payload {
        hook: kind.path(),
        source,
    };

    let event = match kind {
        HookKind::Progress => Event::Progress { data },
        HookKind::Completion => {
            Event::Completion(serde_json::from_value::<CompletionEvent>(data).map_err(payload_error)?)
        }
        HookKind::ToolCall => {
            // Keep the id so a malformed call can still be answered
            let tool_call_id = data["tool_call_id"].as_str().map(str::to_string);
            match (serde_json::from_value::<ToolCallEvent>(data), tool_call_id) {
                (Ok(call), _) => Event::ToolCall(call),
                (Err(e), Some(tool_call_id)) => Event::InvalidToolCall {
                    tool_call_id,
                    reason: e.to_string(),
                },
                (Err(e), None) => return Err(payload_error(e)),
            }
        }
        HookKind::DialAction => Event::DialAction(if data.is_null() {
            DialOutcome::default()
        } else {
            serde_json::from_value::<DialOutcome>(data).map_err(payload_error)?
        }),
        HookKind::DialConfirm => Event::DialConfirm,
    };
    Ok(event)
}
