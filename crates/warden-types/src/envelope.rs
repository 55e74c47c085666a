use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{Changeset, Entity};

/// What triggered an evaluation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    Save,
    Transition,
}

/// The `session` namespace of an envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub discriminator: String,
    pub event: SessionEvent,
}

impl SessionInfo {
    pub fn interceptor_save() -> Self {
        Self {
            discriminator: "INTERCEPTOR_SAVE".to_string(),
            event: SessionEvent::Save,
        }
    }
}

/// Evaluation input for one mutation.
///
/// Top-level keys are namespaces: `host`, `meta`, `changeset`, `session`,
/// plus whatever the registered context providers contribute (`system`,
/// `actor`, `config`, ...). Built fresh per mutation and discarded after.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextEnvelope(Map<String, Value>);

impl ContextEnvelope {
    pub const HOST: &'static str = "host";
    pub const META: &'static str = "meta";
    pub const CHANGESET: &'static str = "changeset";
    pub const SESSION: &'static str = "session";

    /// Partial envelope for a staged entity, before provider namespaces are merged.
    pub fn for_entity(entity: &Entity, changeset: &Changeset, session: SessionInfo) -> Self {
        let mut map = Map::new();
        map.insert(Self::HOST.to_string(), entity.host_snapshot());
        map.insert(Self::META.to_string(), entity.meta_snapshot());
        map.insert(Self::CHANGESET.to_string(), changeset.to_value());
        map.insert(
            Self::SESSION.to_string(),
            serde_json::to_value(session).unwrap_or(Value::Null),
        );
        Self(map)
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn insert_namespace(&mut self, namespace: impl Into<String>, values: Value) {
        self.0.insert(namespace.into(), values);
    }

    pub fn namespace(&self, namespace: &str) -> Option<&Value> {
        self.0.get(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Request identifier contributed by the `system` provider, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.0
            .get("system")
            .and_then(|system| system.get("request_id"))
            .and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
