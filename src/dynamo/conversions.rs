//! Type conversions between entities and DynamoDB AttributeValue.

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::entity::{Entity, EntityValue, PARTITION_KEY, ROW_KEY};
use crate::errors::{Result, ServiceError};
use crate::query::ContinuationToken;

/// Map key marking a date-time value. DynamoDB has no native date type.
pub const DATETIME_TAG: &str = "DateTime";

/// Convert an entity value to a DynamoDB AttributeValue.
///
/// Doubles always carry a decimal point or exponent so they read back as
/// doubles, not integers.
pub fn entity_value_to_attribute_value(value: &EntityValue) -> AttributeValue {
    match value {
        EntityValue::String(s) => AttributeValue::S(s.clone()),
        EntityValue::Int(i) => AttributeValue::N(i.to_string()),
        EntityValue::Double(f) => AttributeValue::N(format!("{:?}", f)),
        EntityValue::Boolean(b) => AttributeValue::Bool(*b),
        EntityValue::Binary(bytes) => AttributeValue::B(Blob::new(bytes.clone())),
        EntityValue::DateTime(dt) => {
            let mut tagged = HashMap::new();
            tagged.insert(DATETIME_TAG.to_string(), datetime_attribute(dt));
            AttributeValue::M(tagged)
        }
    }
}

/// Inner string of a tagged date-time.
///
/// Fixed-width UTC with microseconds, so string order is time order.
pub fn datetime_attribute(dt: &DateTime<Utc>) -> AttributeValue {
    AttributeValue::S(dt.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Convert a DynamoDB AttributeValue back to an entity value.
pub fn attribute_value_to_entity_value(name: &str, value: AttributeValue) -> Result<EntityValue> {
    match value {
        AttributeValue::S(s) => Ok(EntityValue::String(s)),
        AttributeValue::N(n) => parse_number(name, &n),
        AttributeValue::Bool(b) => Ok(EntityValue::Boolean(b)),
        AttributeValue::B(b) => Ok(EntityValue::Binary(b.into_inner())),
        AttributeValue::M(mut map) if map.len() == 1 => match map.remove(DATETIME_TAG) {
            Some(AttributeValue::S(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| EntityValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| {
                    serialization_error(format!("Invalid date-time in '{}': {}", name, e))
                }),
            _ => Err(unsupported(name)),
        },
        _ => Err(unsupported(name)),
    }
}

fn parse_number(name: &str, n: &str) -> Result<EntityValue> {
    if n.contains('.') || n.contains('e') || n.contains('E') {
        n.parse::<f64>()
            .map(EntityValue::Double)
            .map_err(|_| serialization_error(format!("Invalid number in '{}': {}", name, n)))
    } else {
        n.parse::<i64>()
            .map(EntityValue::Int)
            .map_err(|_| serialization_error(format!("Invalid number in '{}': {}", name, n)))
    }
}

fn unsupported(name: &str) -> crate::errors::Error {
    serialization_error(format!(
        "Unsupported DynamoDB type in '{}'. Supported types: S, N, BOOL, B, DateTime map",
        name
    ))
}

fn serialization_error(message: String) -> crate::errors::Error {
    ServiceError::new(message)
        .with_code("SerializationException")
        .into()
}

/// Convert an entity to a DynamoDB item.
pub fn entity_to_item(entity: &Entity) -> HashMap<String, AttributeValue> {
    entity
        .properties()
        .iter()
        .map(|(name, value)| (name.clone(), entity_value_to_attribute_value(value)))
        .collect()
}

/// Convert a DynamoDB item to an entity.
pub fn item_to_entity(item: HashMap<String, AttributeValue>) -> Result<Entity> {
    let mut properties = BTreeMap::new();
    for (name, value) in item {
        let converted = attribute_value_to_entity_value(&name, value)?;
        properties.insert(name, converted);
    }
    Ok(Entity::from_properties(properties))
}

/// Primary key attributes of an entity.
pub fn entity_key(entity: &Entity) -> Result<HashMap<String, AttributeValue>> {
    match (entity.partition_key(), entity.row_key()) {
        (Some(pk), Some(rk)) => Ok(key(pk, rk)),
        _ => Err(ServiceError::new("The entity is missing PartitionKey or RowKey.")
            .with_status(400)
            .with_code("ValidationException")
            .into()),
    }
}

pub fn key(partition_key: &str, row_key: &str) -> HashMap<String, AttributeValue> {
    let mut key = HashMap::new();
    key.insert(
        PARTITION_KEY.to_string(),
        AttributeValue::S(partition_key.to_string()),
    );
    key.insert(ROW_KEY.to_string(), AttributeValue::S(row_key.to_string()));
    key
}

/// `ExclusiveStartKey` for a continuation token.
pub fn token_to_start_key(token: &ContinuationToken) -> HashMap<String, AttributeValue> {
    let mut start = HashMap::new();
    start.insert(
        PARTITION_KEY.to_string(),
        AttributeValue::S(token.next_partition_key.clone()),
    );
    if let Some(rk) = &token.next_row_key {
        start.insert(ROW_KEY.to_string(), AttributeValue::S(rk.clone()));
    }
    start
}

/// Continuation token from a `LastEvaluatedKey`.
pub fn start_key_to_token(
    last_evaluated_key: &HashMap<String, AttributeValue>,
) -> Option<ContinuationToken> {
    let partition_key = match last_evaluated_key.get(PARTITION_KEY) {
        Some(AttributeValue::S(pk)) => pk.clone(),
        _ => return None,
    };
    let row_key = match last_evaluated_key.get(ROW_KEY) {
        Some(AttributeValue::S(rk)) => Some(rk.clone()),
        _ => None,
    };
    Some(ContinuationToken::new(partition_key, row_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_numbers_keep_their_kind() {
        assert_eq!(
            entity_value_to_attribute_value(&EntityValue::Double(1.0)),
            AttributeValue::N("1.0".to_string())
        );
        assert_eq!(
            attribute_value_to_entity_value("n", AttributeValue::N("1.0".into())).unwrap(),
            EntityValue::Double(1.0)
        );
        assert_eq!(
            attribute_value_to_entity_value("n", AttributeValue::N("-12".into())).unwrap(),
            EntityValue::Int(-12)
        );
        assert_eq!(
            attribute_value_to_entity_value("n", AttributeValue::N("2.5e3".into())).unwrap(),
            EntityValue::Double(2500.0)
        );
    }

    #[test]
    fn test_item_conversion() {
        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let entity = Entity::new("orders", "0001")
            .with("paid", true)
            .with("total", 19.99)
            .with("placed", when)
            .with("receipt", vec![0xde_u8, 0xad]);

        let item = entity_to_item(&entity);
        assert_eq!(item.get("paid"), Some(&AttributeValue::Bool(true)));
        assert!(matches!(item.get("placed"), Some(AttributeValue::M(_))));

        assert_eq!(item_to_entity(item).unwrap(), entity);
    }

    #[test]
    fn test_unsupported_type_is_reported() {
        let mut item = key("p", "r");
        item.insert("tags".to_string(), AttributeValue::Ss(vec!["a".into()]));

        let err = item_to_entity(item).unwrap_err();
        let service = err.service().unwrap();
        assert_eq!(service.code.as_deref(), Some("SerializationException"));
        assert!(service.message.contains("tags"));
    }

    #[test]
    fn test_token_start_key() {
        let token = ContinuationToken::new("p", Some("r".to_string()));
        let start = token_to_start_key(&token);
        assert_eq!(start_key_to_token(&start), Some(token));
        assert_eq!(start_key_to_token(&HashMap::new()), None);
    }
}
