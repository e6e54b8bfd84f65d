//! Queries, filters, continuation tokens and result pages.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD as BASE64};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::entity::{Entity, EntityValue, PARTITION_KEY};
use crate::errors::{Error, Result};

/// Comparison operator in a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    /// Operator symbol in DynamoDB expression syntax.
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    fn accepts(&self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (CompareOp::Ne, None) => true,
            (_, None) => false,
            (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
            (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
            (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
            (CompareOp::Ge, Some(o)) => o != Ordering::Less,
            (CompareOp::Lt, Some(o)) => o == Ordering::Less,
            (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        }
    }
}

/// A predicate over entity properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Compare {
        property: String,
        op: CompareOp,
        value: EntityValue,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(property: impl Into<String>, op: CompareOp, value: impl Into<EntityValue>) -> Self {
        Filter::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        Self::compare(property, CompareOp::Eq, value)
    }

    pub fn ne(property: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        Self::compare(property, CompareOp::Ne, value)
    }

    pub fn gt(property: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        Self::compare(property, CompareOp::Gt, value)
    }

    pub fn ge(property: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        Self::compare(property, CompareOp::Ge, value)
    }

    pub fn lt(property: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        Self::compare(property, CompareOp::Lt, value)
    }

    pub fn le(property: impl Into<String>, value: impl Into<EntityValue>) -> Self {
        Self::compare(property, CompareOp::Le, value)
    }

    /// `PartitionKey eq <partition_key>`.
    pub fn partition_key_eq(partition_key: impl Into<String>) -> Self {
        Self::eq(PARTITION_KEY, EntityValue::String(partition_key.into()))
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Evaluate the filter against an entity.
    ///
    /// A comparison on a missing property is false, except `ne`.
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Filter::Compare {
                property,
                op,
                value,
            } => op.accepts(entity.get(property).and_then(|v| v.compare(value))),
            Filter::And(a, b) => a.matches(entity) && b.matches(entity),
            Filter::Or(a, b) => a.matches(entity) || b.matches(entity),
            Filter::Not(inner) => !inner.matches(entity),
        }
    }

    /// Check every property name in the tree.
    pub fn validate(&self) -> Result<()> {
        match self {
            Filter::Compare { property, .. } => validate_property_name(property),
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.validate()?;
                b.validate()
            }
            Filter::Not(inner) => inner.validate(),
        }
    }
}

fn validate_property_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidQuery("property name is empty".to_string()));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidQuery(format!(
            "property name '{}' contains whitespace or control characters",
            name.escape_debug()
        )));
    }
    Ok(())
}

/// A table query: an optional filter, page size and projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableQuery {
    pub filter: Option<Filter>,
    /// Maximum number of entities per page.
    pub top: Option<usize>,
    /// Properties to return. Keys are always returned.
    pub select: Option<Vec<String>>,
}

impl TableQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    pub fn select<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Query matching every entity of one partition.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self::new().filter(Filter::partition_key_eq(partition_key))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        if self.top == Some(0) {
            return Err(Error::InvalidQuery("top must be at least 1".to_string()));
        }
        if let Some(select) = &self.select {
            for name in select {
                validate_property_name(name)?;
            }
        }
        Ok(())
    }

    /// Whether an entity passes the filter. No filter matches everything.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(entity))
    }
}

/// Where the next page of a query starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub next_partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_row_key: Option<String>,
}

impl ContinuationToken {
    pub fn new(next_partition_key: impl Into<String>, next_row_key: Option<String>) -> Self {
        Self {
            next_partition_key: next_partition_key.into(),
            next_row_key,
        }
    }

    /// Encode into an opaque string that can be stored and handed back later.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(BASE64.encode(json))
    }

    /// Decode a string produced by [`ContinuationToken::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let json = BASE64
            .decode(encoded)
            .map_err(|e| Error::InvalidContinuationToken(format!("invalid base64: {}", e)))?;
        serde_json::from_slice(&json).map_err(|e| Error::InvalidContinuationToken(e.to_string()))
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub entries: Vec<Entity>,
    /// `None` on the last page.
    pub continuation_token: Option<ContinuationToken>,
}

impl QueryPage {
    pub fn new(entries: Vec<Entity>, continuation_token: Option<ContinuationToken>) -> Self {
        Self {
            entries,
            continuation_token,
        }
    }

    pub fn is_last(&self) -> bool {
        self.continuation_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(age: i64) -> Entity {
        Entity::new("people", age.to_string()).with("age", age)
    }

    #[test]
    fn test_filter_matching() {
        let filter = Filter::ge("age", 18).and(Filter::lt("age", 65));
        assert!(filter.matches(&person(30)));
        assert!(!filter.matches(&person(12)));
        assert!(!filter.matches(&person(70)));
        assert!(filter.clone().not().matches(&person(70)));
    }

    #[test]
    fn test_missing_property() {
        let entity = Entity::new("p", "r");
        assert!(!Filter::eq("color", "red").matches(&entity));
        assert!(Filter::ne("color", "red").matches(&entity));
    }

    #[test]
    fn test_partition_filter() {
        let query = TableQuery::partition("orders");
        assert!(query.matches(&Entity::new("orders", "1")));
        assert!(!query.matches(&Entity::new("users", "1")));
        assert!(TableQuery::new().matches(&Entity::new("users", "1")));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        let bad = TableQuery::new().filter(Filter::eq("first name", "x"));
        assert!(matches!(bad.validate(), Err(Error::InvalidQuery(_))));

        let nested = TableQuery::new().filter(Filter::eq("a", 1).or(Filter::eq("", 2)));
        assert!(matches!(nested.validate(), Err(Error::InvalidQuery(_))));

        assert!(matches!(TableQuery::new().top(0).validate(), Err(Error::InvalidQuery(_))));
        assert!(TableQuery::partition("p").top(10).validate().is_ok());
    }

    #[test]
    fn test_token_encode_decode() {
        let token = ContinuationToken::new("p1", Some("r9".to_string()));
        let encoded = token.encode().unwrap();
        assert_eq!(ContinuationToken::decode(&encoded).unwrap(), token);

        assert!(matches!(
            ContinuationToken::decode("not a token!"),
            Err(Error::InvalidContinuationToken(_))
        ));
    }
}
