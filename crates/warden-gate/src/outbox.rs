//! Construction of outbox rows.
//!
//! Every row carries the same `{meta, data}` payload shape. Rows are built
//! here and appended to the pending transaction by the caller; nothing in
//! this module touches storage.

use chrono::Utc;
use serde_json::{json, Value};
use warden_types::{
    partition_key_for, Changeset, Entity, EntityId, EventMeta, EventPayload, NewOutboxEvent,
    PendingTransition, SystemEvent,
};

/// Payload version for events the pipeline emits on its own.
pub const INTERNAL_EVENT_VERSION: &str = "1.0.0";

/// Trace id used when no request is in scope.
pub const SYSTEM_TRACE: &str = "system";

/// Builds outbox rows stamped with a fixed source.
#[derive(Clone, Debug)]
pub struct OutboxWriter {
    source: String,
}

impl OutboxWriter {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Low-level row construction.
    ///
    /// A missing or empty `partition_key` defaults to the entity id, or
    /// `global` without one.
    pub fn event(
        &self,
        event_name: impl Into<String>,
        version: &str,
        data: Value,
        entity_id: Option<EntityId>,
        partition_key: Option<String>,
        trace_id: Option<&str>,
    ) -> NewOutboxEvent {
        let now = Utc::now();
        let trace_id = trace_id.unwrap_or(SYSTEM_TRACE).to_string();
        NewOutboxEvent {
            event_name: event_name.into(),
            partition_key: partition_key
                .filter(|key| !key.is_empty())
                .unwrap_or_else(|| partition_key_for(entity_id)),
            trace_id: Some(trace_id.clone()),
            payload: EventPayload {
                meta: EventMeta {
                    version: version.to_string(),
                    timestamp: now,
                    source: self.source.clone(),
                    trace_id,
                },
                data,
            },
            entity_id,
            created_at: now,
        }
    }

    /// Row for a validated system event published by application code.
    pub fn publish(
        &self,
        event: &SystemEvent,
        payload: Value,
        entity_id: Option<EntityId>,
        partition_key: Option<String>,
        trace_id: Option<&str>,
    ) -> NewOutboxEvent {
        self.event(
            event.name(),
            event.version(),
            payload,
            entity_id,
            partition_key,
            trace_id,
        )
    }

    /// `<DOMAIN>:CREATED` or `<DOMAIN>:UPDATED` change-data-capture row.
    pub fn change_captured(
        &self,
        entity: &Entity,
        domain: &str,
        is_new: bool,
        changes: &Changeset,
        trace_id: Option<&str>,
    ) -> NewOutboxEvent {
        let verb = if is_new { "CREATED" } else { "UPDATED" };
        let data = json!({
            "entity_id": entity.id,
            "domain": domain,
            "model": entity.type_name,
            "changes": changes.to_value(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.event(
            format!("{domain}:{verb}"),
            INTERNAL_EVENT_VERSION,
            data,
            entity.id,
            Some(entity.partition_key()),
            trace_id,
        )
    }

    /// `WORKFLOW:<ACTION>` row for one action declared on a transition.
    pub fn workflow_action(
        &self,
        action: &str,
        transition: &PendingTransition,
        entity: &Entity,
        trace_id: Option<&str>,
    ) -> NewOutboxEvent {
        let data = json!({
            "action": action,
            "workflow": transition.workflow,
            "scope": transition.scope,
            "from": transition.from,
            "to": transition.to,
            "entity_id": entity.id,
            "domain": entity.domain_key(),
        });
        self.event(
            format!("WORKFLOW:{}", action.to_uppercase()),
            INTERNAL_EVENT_VERSION,
            data,
            entity.id,
            Some(entity.partition_key()),
            trace_id,
        )
    }

    /// Row for a TRIGGER_EVENT rule effect.
    pub fn triggered(
        &self,
        event_name: &str,
        payload: Value,
        entity: &Entity,
        trace_id: Option<&str>,
    ) -> NewOutboxEvent {
        self.event(
            event_name,
            INTERNAL_EVENT_VERSION,
            payload,
            entity.id,
            Some(entity.partition_key()),
            trace_id,
        )
    }

    /// `<DOMAIN>:TRANSITION_REQUESTED` row for a TRANSITION rule effect.
    pub fn transition_requested(
        &self,
        domain: &str,
        target: Value,
        entity: &Entity,
        trace_id: Option<&str>,
    ) -> NewOutboxEvent {
        let data = json!({
            "entity_id": entity.id,
            "domain": domain,
            "target": target,
        });
        self.event(
            format!("{domain}:TRANSITION_REQUESTED"),
            INTERNAL_EVENT_VERSION,
            data,
            entity.id,
            Some(entity.partition_key()),
            trace_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_defaults_partition_to_entity_or_global() {
        let writer = OutboxWriter::new("warden-kernel");
        let login = SystemEvent::named("USER:LOGIN").unwrap();

        let keyed = writer.publish(&login, json!({"ip": "10.0.0.1"}), Some(1), None, None);
        assert_eq!(keyed.partition_key, "1");
        assert_eq!(keyed.event_name, "USER:LOGIN");
        assert_eq!(keyed.payload.meta.version, "1.0.0");
        assert_eq!(keyed.payload.meta.source, "warden-kernel");
        assert_eq!(keyed.payload.meta.trace_id, "system");
        assert_eq!(keyed.payload.data["ip"], "10.0.0.1");

        let global = writer.publish(&login, json!({}), None, None, Some("req-3"));
        assert_eq!(global.partition_key, "global");
        assert_eq!(global.trace_id.as_deref(), Some("req-3"));

        let custom = writer.publish(&login, json!({}), Some(1), Some("tenant-9".into()), None);
        assert_eq!(custom.partition_key, "tenant-9");
    }

    #[test]
    fn empty_partition_key_falls_back_to_default() {
        let writer = OutboxWriter::new("warden-kernel");
        let login = SystemEvent::named("USER:LOGIN").unwrap();
        let payload = json!({"email": "a@b.com"});

        let blank = writer.publish(&login, payload.clone(), Some(1), Some(String::new()), None);
        let implicit = writer.publish(&login, payload.clone(), Some(1), None, None);
        assert_eq!(blank.partition_key, "1");
        assert_eq!(blank.partition_key, implicit.partition_key);

        let unkeyed = writer.publish(&login, payload, None, Some(String::new()), None);
        assert_eq!(unkeyed.partition_key, "global");
    }

    #[test]
    fn change_capture_names_and_payload() {
        let writer = OutboxWriter::new("warden-kernel");
        let order = Entity::new("Order").with_id(12).with_field("total", 30);
        let changes = Changeset::between(None, &order);

        let created = writer.change_captured(&order, "ORDER", true, &changes, Some("req-1"));
        assert_eq!(created.event_name, "ORDER:CREATED");
        assert_eq!(created.partition_key, "12");
        assert_eq!(created.payload.data["model"], "Order");
        assert_eq!(created.payload.data["changes"]["total"]["new"], 30);

        let updated = writer.change_captured(&order, "ORDER", false, &changes, None);
        assert_eq!(updated.event_name, "ORDER:UPDATED");
    }

    #[test]
    fn workflow_action_is_upper_cased() {
        let writer = OutboxWriter::new("warden-kernel");
        let account = Entity::new("Account").with_id(4);
        let transition = PendingTransition {
            workflow: "account_lifecycle".into(),
            scope: "LIFECYCLE".into(),
            field: "status".into(),
            from: Some("PENDING".into()),
            to: "ACTIVE".into(),
            guard: None,
            actions: vec!["send_email".into()],
        };

        let row = writer.workflow_action("send_email", &transition, &account, None);
        assert_eq!(row.event_name, "WORKFLOW:SEND_EMAIL");
        assert_eq!(row.payload.data["action"], "send_email");
        assert_eq!(row.payload.data["from"], "PENDING");
        assert_eq!(row.partition_key, "4");
    }
}
