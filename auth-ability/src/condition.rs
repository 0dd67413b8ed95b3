//! Condition specifications and the in-memory matcher
//!
//! A [`Conditions`] value maps attribute names to [`Condition`]s. Matching is
//! pure and total: a missing attribute is a non-match, never an error.

use crate::{
    error::{AbilityError, Result},
    models::Scalar,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Expected value for a single attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality, or membership when the attribute holds a collection
    Equals(Scalar),
    /// The attribute equals (or, for collections, shares) one of the listed values
    AnyOf(Vec<Scalar>),
    /// The attribute is a collection holding this value
    Contains(Scalar),
    /// Recurse into an object-valued attribute
    Nested(Conditions),
}

impl Condition {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::Equals(expected) => expected.equals_or_contained_in(actual),
            Self::AnyOf(expected) => expected.iter().any(|e| e.equals_or_contained_in(actual)),
            Self::Contains(expected) => expected.is_element_of(actual),
            Self::Nested(inner) => match actual {
                Value::Object(attributes) => inner.matches(attributes),
                _ => false,
            },
        }
    }
}

/// Attribute conditions joined by AND. Empty means "always".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: BTreeMap<String, Condition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, attribute: &str, value: impl Into<Scalar>) -> Self {
        self.entries
            .insert(attribute.to_string(), Condition::Equals(value.into()));
        self
    }

    pub fn any_of<I, S>(mut self, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.entries
            .insert(attribute.to_string(), Condition::AnyOf(values));
        self
    }

    pub fn contains(mut self, attribute: &str, value: impl Into<Scalar>) -> Self {
        self.entries
            .insert(attribute.to_string(), Condition::Contains(value.into()));
        self
    }

    /// Nest conditions under an object-valued attribute.
    /// An empty nested set places no constraint and is dropped.
    pub fn nested(mut self, attribute: &str, inner: Conditions) -> Self {
        if inner.is_empty() {
            self.entries.remove(attribute);
        } else {
            self.entries
                .insert(attribute.to_string(), Condition::Nested(inner));
        }
        self
    }

    /// Parse a JSON condition document.
    ///
    /// Objects nest, arrays become [`Condition::AnyOf`], scalars become
    /// [`Condition::Equals`]. `Contains` has no JSON spelling; use the builder.
    pub fn from_json(document: &Value) -> Result<Self> {
        match document {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Self::from_json_map(map),
            other => Err(AbilityError::InvalidCondition(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    fn from_json_map(map: &Map<String, Value>) -> Result<Self> {
        let mut conditions = Self::new();
        for (attribute, expected) in map {
            conditions = match expected {
                Value::Object(_) => conditions.nested(attribute, Self::from_json(expected)?),
                Value::Array(items) => {
                    let values = items
                        .iter()
                        .map(|item| {
                            Scalar::from_json(item).ok_or_else(|| {
                                AbilityError::InvalidCondition(format!(
                                    "'{}' lists a non-scalar value {}",
                                    attribute, item
                                ))
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    conditions.any_of(attribute, values)
                }
                scalar => {
                    let value = Scalar::from_json(scalar).ok_or_else(|| {
                        AbilityError::InvalidCondition(format!(
                            "'{}' has an unsupported value {}",
                            attribute, scalar
                        ))
                    })?;
                    conditions.equals(attribute, value)
                }
            };
        }
        Ok(conditions)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.entries.iter()
    }

    /// Match against an object's attributes
    pub fn matches(&self, attributes: &Map<String, Value>) -> bool {
        self.entries.iter().all(|(attribute, condition)| {
            attributes
                .get(attribute)
                .is_some_and(|actual| condition.matches(actual))
        })
    }
}

impl fmt::Display for Conditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (attribute, condition)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match condition {
                Condition::Equals(v) => write!(f, "{}: {}", attribute, v)?,
                Condition::AnyOf(vs) => {
                    let vs: Vec<String> = vs.iter().map(ToString::to_string).collect();
                    write!(f, "{}: [{}]", attribute, vs.join(", "))?
                }
                Condition::Contains(v) => write!(f, "{} contains {}", attribute, v)?,
                Condition::Nested(inner) => write!(f, "{}: {}", attribute, inner)?,
            }
        }
        write!(f, "}}")
    }
}

impl TryFrom<Value> for Conditions {
    type Error = AbilityError;

    fn try_from(document: Value) -> Result<Self> {
        Self::from_json(&document)
    }
}
