//! Warden policy evaluation.
//!
//! Two layers:
//! - [`expr`]: a small boolean expression language evaluated against a
//!   JSON context map (paths, comparisons, `&&`/`||`/`!`, a few functions)
//! - [`PolicyEngine`]: runs ordered rules from one or more policies and
//!   folds the results into a [`warden_types::Verdict`]
//!
//! Evaluation is pure. Nothing here touches storage or the outbox.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod engine;
mod error;
pub mod expr;

pub use engine::{PolicyEngine, REFERENCE_NAMESPACES};
pub use error::{PolicyError, PolicyResult};
pub use expr::{is_truthy, Expression};
