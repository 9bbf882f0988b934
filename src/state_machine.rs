//! Call session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! every inbound event maps the current [`CallSession`] to the next one plus
//! an ordered list of [`Effect`]s for the runtime to carry out.

pub mod classify;
mod effect;
mod escalation;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{CallContext, CallSession, CallState};
pub use transition::transition;
