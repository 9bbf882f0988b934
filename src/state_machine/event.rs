//! Events that can occur on a call

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Telephony events
    SessionNew {
        call_sid: String,
    },

    // Conversational backend hooks
    Progress {
        data: Value,
    },
    Completion(CompletionEvent),
    ToolCall(ToolCallEvent),
    /// Tool call whose payload could not be decoded; still owed a reply
    InvalidToolCall {
        tool_call_id: String,
        reason: String,
    },

    // Escalation
    /// The transfer delay elapsed (raised by the runtime's timer)
    RedirectDue,
    DialConfirm,
    DialAction(DialOutcome),

    // Transport
    Close {
        code: Option<u16>,
        reason: String,
    },
    TransportError {
        message: String,
    },
}

impl Event {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionNew { .. } => "session_new",
            Event::Progress { .. } => "progress",
            Event::Completion(_) => "completion",
            Event::ToolCall(_) => "tool_call",
            Event::InvalidToolCall { .. } => "invalid_tool_call",
            Event::RedirectDue => "redirect_due",
            Event::DialConfirm => "dial_confirm",
            Event::DialAction(_) => "dial_action",
            Event::Close { .. } => "close",
            Event::TransportError { .. } => "transport_error",
        }
    }
}

/// Payload of the conversation's completion hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    #[serde(default)]
    pub completion_reason: String,
    #[serde(default)]
    pub error: Option<BackendError>,
}

/// Error detail attached to a failed completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackendError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of the tool hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    pub tool_call_id: String,
}

/// Arguments the backend passes to the transfer tool
#[derive(Debug, Default, Deserialize)]
struct TransferArgs {
    #[serde(default, rename = "conversationSummary", alias = "conversation_summary")]
    conversation_summary: Option<String>,
}

impl ToolCallEvent {
    /// Conversation summary from the tool arguments, if one was supplied
    pub fn summary(&self) -> Option<String> {
        let args: TransferArgs = serde_json::from_value(self.args.clone()).unwrap_or_default();
        args.conversation_summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Payload of the agent dial's action hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DialOutcome {
    #[serde(default)]
    pub dial_call_status: Option<String>,
    #[serde(default)]
    pub dial_sip_status: Option<u16>,
    #[serde(default)]
    pub duration: Option<u64>,
}

impl DialOutcome {
    pub fn connected(&self) -> bool {
        self.dial_call_status.as_deref() == Some("completed")
    }
}
