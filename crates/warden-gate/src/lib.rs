//! Warden interception pipeline.
//!
//! Every entity write committed through a [`UnitOfWork`] passes the
//! [`MutationInterceptor`] first:
//! - bound policies are evaluated and may block, warn, rewrite fields or
//!   request side effects
//! - governed-field changes are checked against active workflows, and
//!   transition guards are verified
//! - outbox rows for side effects, transition actions and the change
//!   itself are written in the same transaction as the entity
//!
//! Governance decisions fail closed. Failures of the machinery that feeds
//! them follow the configured [`FailurePolicies`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod failure;
pub mod governance;
pub mod handshake;
pub mod identity;
pub mod interceptor;
pub mod kernel;
pub mod outbox;
pub mod unit_of_work;

pub use bridge::AsyncBridge;
pub use config::GateConfig;
pub use context::{
    ActorProvider, ConfigProvider, ContextField, ContextProvider, ContextRegistry, FieldType,
    SystemProvider,
};
pub use error::{GateError, GateResult};
pub use failure::{FailurePolicies, FailurePolicy, FailureSite};
pub use governance::GovernanceEvaluator;
pub use handshake::TransitionHandshake;
pub use identity::{current_identity, with_identity};
pub use interceptor::MutationInterceptor;
pub use kernel::{WardenKernel, WardenKernelBuilder};
pub use outbox::OutboxWriter;
pub use unit_of_work::{EntityHandle, FlushContext, FlushHook, StagedEntity, UnitOfWork};
