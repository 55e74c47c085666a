use serde::{Deserialize, Serialize};

/// The principal on whose behalf a mutation is made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_system: bool,
}

impl Actor {
    pub fn new(id: i64, email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            role: role.into(),
            is_superuser: false,
            is_system: false,
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    /// Identity used for background work with no human caller.
    pub fn system() -> Self {
        Self {
            id: 0,
            email: "system@kernel".to_string(),
            role: "system_operator".to_string(),
            is_superuser: true,
            is_system: true,
        }
    }
}

/// Caller-scoped identity captured at the start of a unit of work.
///
/// Carried explicitly across the sync/async boundary so evaluation running
/// on another thread sees the same actor and trace id as the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub actor: Option<Actor>,
    pub trace_id: Option<String>,
}

impl CallerIdentity {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor: Some(actor),
            trace_id: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Actor to evaluate as, falling back to the system actor.
    pub fn effective_actor(&self) -> Actor {
        self.actor.clone().unwrap_or_else(Actor::system)
    }
}
