//! Entities: open-ended property maps keyed by partition and row key.
//!
//! The schema of a table is defined by the caller. This layer only requires
//! the two key properties and otherwise passes values through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Name of the partition key property.
pub const PARTITION_KEY: &str = "PartitionKey";

/// Name of the row key property.
pub const ROW_KEY: &str = "RowKey";

/// Name of the server-maintained last-modified property.
pub const TIMESTAMP: &str = "Timestamp";

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EntityValue {
    String(String),
    Int(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Binary(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl EntityValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EntityValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values the way a table filter does.
    ///
    /// Numbers compare across `Int` and `Double`. Values of unrelated types
    /// are unordered.
    pub fn compare(&self, other: &EntityValue) -> Option<Ordering> {
        match (self, other) {
            (EntityValue::String(a), EntityValue::String(b)) => Some(a.cmp(b)),
            (EntityValue::Int(a), EntityValue::Int(b)) => Some(a.cmp(b)),
            (EntityValue::Double(a), EntityValue::Double(b)) => a.partial_cmp(b),
            (EntityValue::Int(a), EntityValue::Double(b)) => (*a as f64).partial_cmp(b),
            (EntityValue::Double(a), EntityValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (EntityValue::Boolean(a), EntityValue::Boolean(b)) => Some(a.cmp(b)),
            (EntityValue::DateTime(a), EntityValue::DateTime(b)) => Some(a.cmp(b)),
            (EntityValue::Binary(a), EntityValue::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        EntityValue::String(value.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(value: String) -> Self {
        EntityValue::String(value)
    }
}

impl From<i64> for EntityValue {
    fn from(value: i64) -> Self {
        EntityValue::Int(value)
    }
}

impl From<i32> for EntityValue {
    fn from(value: i32) -> Self {
        EntityValue::Int(value.into())
    }
}

impl From<f64> for EntityValue {
    fn from(value: f64) -> Self {
        EntityValue::Double(value)
    }
}

impl From<bool> for EntityValue {
    fn from(value: bool) -> Self {
        EntityValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for EntityValue {
    fn from(value: DateTime<Utc>) -> Self {
        EntityValue::DateTime(value)
    }
}

impl From<Vec<u8>> for EntityValue {
    fn from(value: Vec<u8>) -> Self {
        EntityValue::Binary(value)
    }
}

/// A table entity.
///
/// Properties are kept in name order so two entities with the same content
/// compare equal and serialize identically.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity {
    properties: BTreeMap<String, EntityValue>,
}

impl Entity {
    /// Create an entity with its two key properties set.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            PARTITION_KEY.to_string(),
            EntityValue::String(partition_key.into()),
        );
        properties.insert(ROW_KEY.to_string(), EntityValue::String(row_key.into()));
        Self { properties }
    }

    /// Build an entity from a raw property map, keys included.
    pub fn from_properties(properties: BTreeMap<String, EntityValue>) -> Self {
        Self { properties }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<EntityValue>,
    ) -> Option<EntityValue> {
        self.properties.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&EntityValue> {
        self.properties.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<EntityValue> {
        self.properties.remove(name)
    }

    /// The partition key, if present and a string.
    pub fn partition_key(&self) -> Option<&str> {
        self.get(PARTITION_KEY).and_then(EntityValue::as_str)
    }

    /// The row key, if present and a string.
    pub fn row_key(&self) -> Option<&str> {
        self.get(ROW_KEY).and_then(EntityValue::as_str)
    }

    /// Properties other than the partition and row key.
    pub fn attributes(&self) -> impl Iterator<Item = (&String, &EntityValue)> {
        self.properties
            .iter()
            .filter(|(name, _)| !is_key_property(name))
    }

    pub fn properties(&self) -> &BTreeMap<String, EntityValue> {
        &self.properties
    }

    pub fn into_properties(self) -> BTreeMap<String, EntityValue> {
        self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Copy every property of `other` over this entity, keeping the rest.
    pub fn merge_from(&mut self, other: &Entity) {
        for (name, value) in &other.properties {
            self.properties.insert(name.clone(), value.clone());
        }
    }

    /// Keep only the named properties plus the keys and timestamp.
    pub fn project(&self, select: &[String]) -> Entity {
        let properties = self
            .properties
            .iter()
            .filter(|(name, _)| {
                is_key_property(name) || name.as_str() == TIMESTAMP || select.contains(name)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Entity { properties }
    }
}

/// Whether `name` is the partition or row key property.
pub fn is_key_property(name: &str) -> bool {
    name == PARTITION_KEY || name == ROW_KEY
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_keys() {
        let entity = Entity::new("users", "42");
        assert_eq!(entity.partition_key(), Some("users"));
        assert_eq!(entity.row_key(), Some("42"));
        assert_eq!(entity.attributes().count(), 0);
    }

    #[test]
    fn test_merge_keeps_unlisted_properties() {
        let mut stored = Entity::new("p", "r").with("name", "old").with("age", 30);
        let patch = Entity::new("p", "r").with("name", "new");
        stored.merge_from(&patch);

        assert_eq!(stored.get("name"), Some(&EntityValue::from("new")));
        assert_eq!(stored.get("age"), Some(&EntityValue::Int(30)));
    }

    #[test]
    fn test_project_keeps_keys() {
        let entity = Entity::new("p", "r").with("a", 1).with("b", 2);
        let projected = entity.project(&["b".to_string()]);

        assert_eq!(projected.partition_key(), Some("p"));
        assert_eq!(projected.row_key(), Some("r"));
        assert!(projected.get("a").is_none());
        assert_eq!(projected.get("b"), Some(&EntityValue::Int(2)));
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(
            EntityValue::Int(2).compare(&EntityValue::Double(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(EntityValue::from("a").compare(&EntityValue::Int(1)), None);
    }

    #[test]
    fn test_serde_binary_as_base64() {
        let entity = Entity::new("p", "r").with("blob", vec![1u8, 2, 3]);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["blob"]["type"], "Binary");
        assert_eq!(json["blob"]["value"], "AQID");

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }
}
