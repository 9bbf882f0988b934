//! Trait abstractions for runtime I/O
//!
//! The call runtime only talks to the telephony side through
//! [`CommandSink`], so the executor can be tested with a recording mock.

use crate::verbs::{ToolOutput, Verb};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// One outbound message to the telephony platform. Verbs within a message
/// are executed in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Reply to the hook identified by `msgid`
    Ack { msgid: String, verbs: Vec<Verb> },
    /// Unsolicited replacement of the call's current verbs
    Redirect { verbs: Vec<Verb> },
    /// Result of a backend tool invocation
    ToolOutput { output: ToolOutput },
}

impl Outbound {
    pub fn verbs(&self) -> &[Verb] {
        match self {
            Outbound::Ack { verbs, .. } | Outbound::Redirect { verbs } => verbs,
            Outbound::ToolOutput { .. } => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("call transport is closed")]
    Closed,
    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for call-control commands
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Deliver one message; messages are delivered in call order
    async fn deliver(&self, message: Outbound) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    async fn deliver(&self, message: Outbound) -> Result<(), SinkError> {
        (**self).deliver(message).await
    }
}
