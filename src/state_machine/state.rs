//! Call session state types

use crate::config::{AgentTarget, ConversationSettings, SummaryDelivery};
use crate::verbs::TRANSFER_TOOL_NAME;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Call State
// ============================================================================

/// Lifecycle state of one call. States only move forward; `Closed` is
/// reachable from anywhere and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Telephony leg reported, nothing issued yet
    #[default]
    Initiated,
    /// Conversational backend owns the call
    Conversing,
    /// Transfer acknowledged, redirect scheduled
    TransferPending,
    /// Agent dial issued
    Transferring,
    /// Agent answered
    TransferActive,
    /// Final commands issued, waiting for the leg to drop
    WrappingUp,
    Closed,
}

impl CallState {
    /// Position in the forward-only ordering
    pub fn rank(self) -> u8 {
        match self {
            CallState::Initiated => 0,
            CallState::Conversing => 1,
            CallState::TransferPending => 2,
            CallState::Transferring => 3,
            CallState::TransferActive => 4,
            CallState::WrappingUp => 5,
            CallState::Closed => 6,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, CallState::Closed)
    }
}

// ============================================================================
// Tool invocations
// ============================================================================

/// Tools this service knows how to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Transfer,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            TRANSFER_TOOL_NAME => Some(ToolKind::Transfer),
            _ => None,
        }
    }
}

/// The outstanding tool invocation; at most one per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub id: String,
    pub kind: ToolKind,
}

// ============================================================================
// Close reasons
// ============================================================================

/// Why a call reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseReason {
    /// Backend reported a failure; apology spoken, call hung up
    BackendFailure { code: Option<String> },
    /// No API key, the conversation could not be started
    ConversationUnavailable,
    /// No agent target, the transfer could not be placed
    TransferUnavailable,
    /// The human agent leg ended
    AgentCallEnded,
    /// Transport closed, or the call ended on the telephony side
    Transport { code: Option<u16>, reason: String },
    TransportError { message: String },
}

// ============================================================================
// Call Session
// ============================================================================

/// Authoritative record for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub id: String,
    pub state: CallState,
    pub pending_tool: Option<PendingToolCall>,
    /// Captured from the transfer tool call, spoken during wrap-up
    pub conversation_summary: Option<String>,
    /// Set once, on entering `Closed`
    pub close_reason: Option<CloseReason>,
    pub started_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: CallState::Initiated,
            pending_tool: None,
            conversation_summary: None,
            close_reason: None,
            started_at: Utc::now(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Move to `state`. Never moves backwards.
    pub(super) fn advance(mut self, state: CallState) -> Self {
        if state.rank() > self.state.rank() {
            self.state = state;
        }
        self
    }

    /// Move to `Closed`, recording `reason` unless one is already recorded
    pub(super) fn close(mut self, reason: CloseReason) -> Self {
        self.state = CallState::Closed;
        self.pending_tool = None;
        if self.close_reason.is_none() {
            self.close_reason = Some(reason);
        }
        self
    }
}

// ============================================================================
// Call Context
// ============================================================================

/// Immutable per-call configuration
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_sid: String,
    pub conversation: ConversationSettings,
    /// `None` means transfers cannot be placed
    pub agent: Option<AgentTarget>,
    /// Delay between acknowledging a transfer and redirecting the call
    pub transfer_delay: Duration,
    pub use_confirm_hook: bool,
    pub summary_delivery: SummaryDelivery,
}

impl CallContext {
    #[cfg(test)]
    pub fn for_tests(call_sid: impl Into<String>) -> Self {
        Self {
            call_sid: call_sid.into(),
            conversation: ConversationSettings {
                api_key: Some("test-key".to_string()),
                ..ConversationSettings::default()
            },
            agent: Some(AgentTarget {
                number: "+15551230000".to_string(),
                trunk: Some("test-trunk".to_string()),
                caller_id: Some("+15550000000".to_string()),
            }),
            transfer_delay: Duration::from_secs(5),
            use_confirm_hook: true,
            summary_delivery: SummaryDelivery::Caller,
        }
    }
}
