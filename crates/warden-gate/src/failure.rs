//! Explicit failure handling per interception site.
//!
//! Governance decisions (a BLOCK verdict, an illegal transition, a rejected
//! guard) always abort the write. Infrastructure failures while gathering
//! what those decisions need are handled by the [`FailurePolicy`] configured
//! for the site.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::GateError;

/// What to do when a site fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the transaction with the error.
    StrictBlock,
    /// Log a warning and let the write continue.
    DegradeToWarning,
    /// Log an error and let the write continue ungoverned.
    FailOpenLogged,
}

/// Where in the pipeline a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureSite {
    /// A bound policy returned BLOCK.
    PolicyViolation,
    /// A single rule raised during evaluation.
    RuleCrash,
    /// Bindings, policies or context could not be loaded.
    GovernanceInfrastructure,
    /// The workflow enforcer rejected the move.
    IllegalTransition,
    /// Workflow definitions could not be loaded.
    WorkflowInfrastructure,
    /// A guard evaluated and was not satisfied.
    GuardRejection,
    /// A guard could not be evaluated.
    GuardInfrastructure,
}

impl FailureSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyViolation => "policy_violation",
            Self::RuleCrash => "rule_crash",
            Self::GovernanceInfrastructure => "governance_infrastructure",
            Self::IllegalTransition => "illegal_transition",
            Self::WorkflowInfrastructure => "workflow_infrastructure",
            Self::GuardRejection => "guard_rejection",
            Self::GuardInfrastructure => "guard_infrastructure",
        }
    }
}

/// Per-site policies for infrastructure failures.
///
/// Decision sites are not configurable: they are always [`FailurePolicy::StrictBlock`],
/// and a rule crash always degrades to a warning inside the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicies {
    #[serde(default = "fail_open")]
    pub governance: FailurePolicy,
    #[serde(default = "fail_open")]
    pub workflow: FailurePolicy,
    #[serde(default = "fail_open")]
    pub guard: FailurePolicy,
}

impl Default for FailurePolicies {
    fn default() -> Self {
        Self {
            governance: FailurePolicy::FailOpenLogged,
            workflow: FailurePolicy::FailOpenLogged,
            guard: FailurePolicy::FailOpenLogged,
        }
    }
}

impl FailurePolicies {
    /// Every infrastructure site aborts the write.
    pub fn strict() -> Self {
        Self {
            governance: FailurePolicy::StrictBlock,
            workflow: FailurePolicy::StrictBlock,
            guard: FailurePolicy::StrictBlock,
        }
    }

    pub fn for_site(&self, site: FailureSite) -> FailurePolicy {
        match site {
            FailureSite::GovernanceInfrastructure => self.governance,
            FailureSite::WorkflowInfrastructure => self.workflow,
            FailureSite::GuardInfrastructure => self.guard,
            FailureSite::RuleCrash => FailurePolicy::DegradeToWarning,
            FailureSite::PolicyViolation
            | FailureSite::IllegalTransition
            | FailureSite::GuardRejection => FailurePolicy::StrictBlock,
        }
    }

    /// Apply the site's policy: `Err` aborts, `Ok` means continue.
    pub fn handle(&self, site: FailureSite, err: GateError) -> Result<(), GateError> {
        match self.for_site(site) {
            FailurePolicy::StrictBlock => Err(err),
            FailurePolicy::DegradeToWarning => {
                warn!(site = site.as_str(), error = %err, "Governance step degraded to warning");
                Ok(())
            }
            FailurePolicy::FailOpenLogged => {
                error!(
                    site = site.as_str(),
                    error = %err,
                    "Governance step failed; write proceeds ungoverned"
                );
                Ok(())
            }
        }
    }
}

fn fail_open() -> FailurePolicy {
    FailurePolicy::FailOpenLogged
}
