//! Runtime for executing calls
//!
//! Each call gets its own task running a [`CallRuntime`]. Events for the
//! call are queued on an mpsc channel and handled one at a time.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{CallRuntime, Inbound};
pub use traits::*;

use crate::state_machine::{CallContext, CallSession, CallState};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const EVENT_QUEUE_DEPTH: usize = 64;

/// A state change observed on a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: CallState,
    pub to: CallState,
}

/// Handle to interact with a running call
pub struct CallHandle {
    pub event_tx: mpsc::Sender<Inbound>,
    pub state_tx: broadcast::Sender<StateChange>,
    /// Resolves to the final session record when the runtime stops
    pub task: JoinHandle<CallSession>,
}

impl CallHandle {
    /// Queue an event for the call. Returns false once the runtime has stopped.
    pub async fn send(&self, inbound: Inbound) -> bool {
        self.event_tx.send(inbound).await.is_ok()
    }

    #[allow(dead_code)] // Observed in tests
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }
}

/// Spawn the runtime for a new call
pub fn start_call<K>(context: CallContext, sink: Arc<K>) -> CallHandle
where
    K: CommandSink + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (state_tx, _) = broadcast::channel(32);

    let runtime = CallRuntime::new(context, sink, event_rx, &event_tx, state_tx.clone());
    let task = tokio::spawn(runtime.run());

    CallHandle {
        event_tx,
        state_tx,
        task,
    }
}
