//! Warden shared types.
//!
//! Every crate in the pipeline speaks this vocabulary:
//! - entities staged for persistence and the changesets between snapshots
//! - the context envelope presented to rule evaluation
//! - policy and workflow definitions as stored in the governance catalog
//! - verdicts and pending transitions produced during interception
//! - outbox events and the system event contract used to publish them

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod entity;
mod envelope;
mod error;
mod event;
mod identity;
mod outbox;
mod policy;
mod verdict;
mod workflow;

pub use entity::{Changeset, Entity, EntityId, FieldChange, ATTRIBUTES_FIELD};
pub use envelope::{ContextEnvelope, SessionEvent, SessionInfo};
pub use error::{TypesError, TypesResult};
pub use event::SystemEvent;
pub use identity::{Actor, CallerIdentity};
pub use outbox::{
    partition_key_for, EventMeta, EventPayload, NewOutboxEvent, OutboxEvent, OutboxEventId,
    OutboxStatus, GLOBAL_PARTITION,
};
pub use policy::{
    BindingTarget, PolicyBinding, PolicyDefinition, PolicyGroup, ResolutionStrategy, Rule,
    RuleAction,
};
pub use verdict::{Mutation, SideEffect, Verdict};
pub use workflow::{
    ActionList, PendingTransition, StateNode, TransitionSpec, WorkflowDefinition,
    DEFAULT_GOVERNED_FIELD, DEFAULT_SCOPE,
};
