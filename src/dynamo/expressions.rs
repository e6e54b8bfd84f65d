//! DynamoDB expression builders.
//!
//! Property names and values always go through placeholders (`#n0`, `:v0`),
//! so names that collide with reserved words need no special handling.

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

use crate::dynamo::conversions::{
    DATETIME_TAG, datetime_attribute, entity_value_to_attribute_value,
};
use crate::entity::{Entity, EntityValue, PARTITION_KEY, ROW_KEY};
use crate::query::Filter;

/// An expression with its placeholder maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

/// Allocates placeholders shared by several expressions of one request.
#[derive(Debug, Default)]
pub struct Placeholders {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder for a property name. The same name reuses its placeholder.
    pub fn name(&mut self, property: &str) -> String {
        if let Some((placeholder, _)) = self.names.iter().find(|(_, n)| n.as_str() == property) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names.insert(placeholder.clone(), property.to_string());
        placeholder
    }

    pub fn value(&mut self, value: &EntityValue) -> String {
        self.attribute(entity_value_to_attribute_value(value))
    }

    /// Placeholder for an already converted attribute value.
    pub fn attribute(&mut self, value: AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    pub fn finish(self, expression: String) -> Expression {
        Expression {
            expression,
            names: self.names,
            values: self.values,
        }
    }
}

/// Render a filter as a condition expression.
pub fn filter_expression(filter: &Filter, placeholders: &mut Placeholders) -> String {
    match filter {
        Filter::Compare {
            property,
            op,
            value,
        } => {
            let name = placeholders.name(property);
            // Date-times are stored as a tagged map; ordering operators only
            // accept scalars, so compare the inner string instead.
            let (operand, value) = match value {
                EntityValue::DateTime(dt) => (
                    format!("{}.{}", name, placeholders.name(DATETIME_TAG)),
                    placeholders.attribute(datetime_attribute(dt)),
                ),
                other => (name, placeholders.value(other)),
            };
            format!("{} {} {}", operand, op.symbol(), value)
        }
        Filter::And(a, b) => format!(
            "({}) AND ({})",
            filter_expression(a, placeholders),
            filter_expression(b, placeholders)
        ),
        Filter::Or(a, b) => format!(
            "({}) OR ({})",
            filter_expression(a, placeholders),
            filter_expression(b, placeholders)
        ),
        Filter::Not(inner) => format!("NOT ({})", filter_expression(inner, placeholders)),
    }
}

/// Projection over the selected properties, keys always included.
pub fn projection_expression(select: &[String], placeholders: &mut Placeholders) -> String {
    let mut parts = vec![placeholders.name(PARTITION_KEY), placeholders.name(ROW_KEY)];
    for property in select {
        if property != PARTITION_KEY && property != ROW_KEY {
            parts.push(placeholders.name(property));
        }
    }
    parts.join(", ")
}

/// `SET` expression writing every non-key property of the entity.
///
/// Returns `None` for an entity with only key properties.
pub fn merge_expression(entity: &Entity) -> Option<Expression> {
    let mut placeholders = Placeholders::new();
    let set_parts: Vec<String> = entity
        .attributes()
        .map(|(name, value)| {
            let name = placeholders.name(name);
            let value = placeholders.value(value);
            format!("{} = {}", name, value)
        })
        .collect();

    if set_parts.is_empty() {
        return None;
    }
    Some(placeholders.finish(format!("SET {}", set_parts.join(", "))))
}

/// Condition that the item exists (or, negated, that it does not).
pub fn key_exists_expression(exists: bool) -> Expression {
    let mut placeholders = Placeholders::new();
    let name = placeholders.name(PARTITION_KEY);
    let function = if exists {
        "attribute_exists"
    } else {
        "attribute_not_exists"
    };
    placeholders.finish(format!("{}({})", function, name))
}
