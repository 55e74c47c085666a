use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use warden_storage::GovernanceCatalog;
use warden_types::Entity;

use super::{ContextField, ContextProvider, FieldType};
use crate::error::GateError;
use crate::identity::current_identity;

/// `system.*`: clock, deployment and request metadata.
#[derive(Clone, Debug)]
pub struct SystemProvider {
    environment: String,
    version: String,
    maintenance: bool,
}

impl SystemProvider {
    pub fn new(environment: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            version: version.into(),
            maintenance: false,
        }
    }

    pub fn with_maintenance(mut self, maintenance: bool) -> Self {
        self.maintenance = maintenance;
        self
    }
}

#[async_trait]
impl ContextProvider for SystemProvider {
    fn namespace(&self) -> &str {
        "system"
    }

    fn schema(&self) -> Vec<ContextField> {
        vec![
            ContextField::new("timestamp", "Timestamp", FieldType::Datetime, "Evaluation time (UTC)"),
            ContextField::new("environment", "Environment", FieldType::String, "Deployment environment"),
            ContextField::new("version", "Version", FieldType::String, "Running kernel version"),
            ContextField::new("request_id", "Request ID", FieldType::String, "Trace id of the calling request"),
            ContextField::new("is_maintenance", "Maintenance Mode", FieldType::Boolean, "Whether maintenance mode is on"),
        ]
    }

    async fn runtime(
        &self,
        _catalog: &dyn GovernanceCatalog,
        _entity: &Entity,
    ) -> Result<Value, GateError> {
        Ok(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "environment": self.environment,
            "version": self.version,
            "request_id": current_identity().trace_id,
            "is_maintenance": self.maintenance,
        }))
    }
}

/// `actor.*`: the caller, or the system actor when there is none.
#[derive(Clone, Debug, Default)]
pub struct ActorProvider;

#[async_trait]
impl ContextProvider for ActorProvider {
    fn namespace(&self) -> &str {
        "actor"
    }

    fn schema(&self) -> Vec<ContextField> {
        vec![
            ContextField::new("id", "User ID", FieldType::Number, "Acting user id"),
            ContextField::new("email", "Email", FieldType::String, "Acting user email"),
            ContextField::new("role", "Role", FieldType::String, "Acting user role"),
            ContextField::new("is_superuser", "Superuser", FieldType::Boolean, "Whether the actor is a superuser"),
            ContextField::new("is_system", "System Actor", FieldType::Boolean, "Set for background work"),
        ]
    }

    async fn runtime(
        &self,
        _catalog: &dyn GovernanceCatalog,
        _entity: &Entity,
    ) -> Result<Value, GateError> {
        serde_json::to_value(current_identity().effective_actor()).map_err(|e| {
            GateError::Provider {
                namespace: "actor".to_string(),
                reason: e.to_string(),
            }
        })
    }
}
