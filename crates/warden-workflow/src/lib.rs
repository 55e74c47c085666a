//! Warden lifecycle workflows.
//!
//! [`StateMachine`] answers whether a governed field may move from one
//! state to another and what the edge carries (guard, actions). The
//! [`WorkflowEnforcer`] applies it to a staged entity's changeset and
//! returns the legal changes as [`warden_types::PendingTransition`]s for
//! the guard handshake.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod enforcer;
mod error;
mod machine;

pub use enforcer::WorkflowEnforcer;
pub use error::{WorkflowError, WorkflowResult};
pub use machine::{StateMachine, TransitionConfig};
