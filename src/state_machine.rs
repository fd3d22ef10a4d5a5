//! Per-user dialogue state machine
//!
//! Elm-style: a pure [`transition`] maps (session, event) to a new session
//! plus effects. The runtime executes the effects and commits the session.

pub mod action;
pub mod effect;
pub mod event;
mod messages;
pub mod state;
pub mod transition;

#[cfg(test)]
mod proptests;

pub use action::Action;
pub use effect::Effect;
pub use event::Event;
pub use messages::{too_long, MSG_STORAGE_ERROR, MSG_TOO_MANY_REQUESTS};
pub use state::{DispatchContext, Session};
pub use transition::{transition, TransitionError, TransitionResult};
