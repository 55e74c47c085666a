use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::outbox::partition_key_for;

/// Identifier assigned to an entity by its store.
pub type EntityId = i64;

/// Changeset key under which free-form attribute edits are reported.
pub const ATTRIBUTES_FIELD: &str = "attributes";

/// A mutable business record staged for persistence.
///
/// Typed columns live in `fields`. The optional `attributes` map is the
/// free-form container exposed to rules under the `meta` namespace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Option<EntityId>,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_override: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
            domain_override: None,
            fields: Map::new(),
            attributes: None,
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Route this entity to an explicit domain instead of its type name.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain_override = Some(domain.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Domain key used to look up bindings and workflows.
    pub fn domain_key(&self) -> String {
        match &self.domain_override {
            Some(domain) => domain.clone(),
            None => self.type_name.to_uppercase(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.as_ref().and_then(|attrs| attrs.get(name))
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
    }

    /// Serialized form presented to rules as `host`.
    pub fn host_snapshot(&self) -> Value {
        let mut host = Map::with_capacity(self.fields.len() + 1);
        host.insert(
            "id".to_string(),
            self.id.map(Value::from).unwrap_or(Value::Null),
        );
        for (name, value) in &self.fields {
            host.insert(name.clone(), value.clone());
        }
        Value::Object(host)
    }

    /// Attribute container presented to rules as `meta`.
    pub fn meta_snapshot(&self) -> Value {
        Value::Object(self.attributes.clone().unwrap_or_default())
    }

    pub fn partition_key(&self) -> String {
        partition_key_for(self.id)
    }
}

/// Old and new value of one altered field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Fields altered between a persisted snapshot and the staged entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Changeset(BTreeMap<String, FieldChange>);

impl Changeset {
    /// Diff `current` against its persisted `original`.
    ///
    /// A new entity (no original) reports every non-null field with a null
    /// old value. Attribute edits are reported as one `attributes` entry.
    pub fn between(original: Option<&Entity>, current: &Entity) -> Self {
        let mut changes = BTreeMap::new();
        let empty = Map::new();
        let before = original.map(|e| &e.fields).unwrap_or(&empty);

        for (name, new) in &current.fields {
            let old = before.get(name).cloned().unwrap_or(Value::Null);
            if &old != new {
                changes.insert(
                    name.clone(),
                    FieldChange {
                        old,
                        new: new.clone(),
                    },
                );
            }
        }
        for (name, old) in before {
            if !current.fields.contains_key(name) && !old.is_null() {
                changes.insert(
                    name.clone(),
                    FieldChange {
                        old: old.clone(),
                        new: Value::Null,
                    },
                );
            }
        }

        let old_attrs = original.map(Entity::meta_snapshot).unwrap_or(Value::Null);
        let new_attrs = match &current.attributes {
            Some(attrs) => Value::Object(attrs.clone()),
            None if original.is_some() => current.meta_snapshot(),
            None => Value::Null,
        };
        if old_attrs != new_attrs && !(old_attrs.is_null() && is_empty_object(&new_attrs)) {
            changes.insert(
                ATTRIBUTES_FIELD.to_string(),
                FieldChange {
                    old: old_attrs,
                    new: new_attrs,
                },
            );
        }

        Self(changes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.0.iter()
    }

    pub fn insert(&mut self, field: impl Into<String>, change: FieldChange) {
        self.0.insert(field.into(), change);
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().map(Map::is_empty).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn domain_key_prefers_override() {
        let plain = Entity::new("Invoice");
        assert_eq!(plain.domain_key(), "INVOICE");

        let routed = Entity::new("Invoice").with_domain("BILLING");
        assert_eq!(routed.domain_key(), "BILLING");
    }

    #[test]
    fn new_entity_changeset_lists_every_set_field() {
        let entity = Entity::new("Order")
            .with_field("status", "DRAFT")
            .with_field("total", 10)
            .with_field("note", Value::Null);

        let changes = Changeset::between(None, &entity);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.get("status").unwrap().old, Value::Null);
        assert_eq!(changes.get("total").unwrap().new, json!(10));
        assert!(!changes.contains("note"));
    }

    #[test]
    fn dirty_entity_changeset_reports_only_differences() {
        let original = Entity::new("Order")
            .with_id(7)
            .with_field("status", "DRAFT")
            .with_field("total", 10);
        let mut current = original.clone();
        current.set_field("status", "OPEN");

        let changes = Changeset::between(Some(&original), &current);
        assert_eq!(changes.len(), 1);
        let status = changes.get("status").unwrap();
        assert_eq!(status.old, json!("DRAFT"));
        assert_eq!(status.new, json!("OPEN"));
    }

    #[test]
    fn attribute_edits_are_reported_under_one_entry() {
        let original = Entity::new("Order").with_id(1).with_attribute("tier", "gold");
        let mut current = original.clone();
        current.set_attribute("tier", "platinum");

        let changes = Changeset::between(Some(&original), &current);
        let attrs = changes.get(ATTRIBUTES_FIELD).unwrap();
        assert_eq!(attrs.old, json!({"tier": "gold"}));
        assert_eq!(attrs.new, json!({"tier": "platinum"}));
    }

    #[test]
    fn unchanged_entity_has_empty_changeset() {
        let original = Entity::new("Order").with_id(3).with_field("status", "OPEN");
        assert!(Changeset::between(Some(&original), &original.clone()).is_empty());
    }

    #[test]
    fn host_snapshot_includes_identity() {
        let entity = Entity::new("Order").with_id(42).with_field("status", "OPEN");
        assert_eq!(entity.host_snapshot(), json!({"id": 42, "status": "OPEN"}));
        assert_eq!(entity.partition_key(), "42");
        assert_eq!(Entity::new("Order").partition_key(), "global");
    }
}
