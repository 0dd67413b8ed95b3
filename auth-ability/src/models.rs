use crate::error::{AbilityError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Action spelling that stands for every action.
pub const ALL_ACTIONS: &str = "access";

/// Subject spelling that stands for every subject type.
pub const ALL_SUBJECTS: &str = "all";

/// An action an actor may perform (e.g. "read", "update")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type of record an action is performed on (e.g. "project", "patient_record")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectType(String);

impl SubjectType {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SubjectType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Actions a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actions {
    /// Every action, spelled `"access"`
    All,
    Only(Vec<Action>),
}

impl Actions {
    pub fn only<I, A>(actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Action>,
    {
        Self::Only(actions.into_iter().map(Into::into).collect())
    }

    /// Parse a list of names, where `"access"` anywhere widens to [`Actions::All`]
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Self {
        if names.iter().any(|n| n.as_ref() == ALL_ACTIONS) {
            Self::All
        } else {
            Self::only(names.iter().map(|n| Action::new(n.as_ref())))
        }
    }
}

impl From<&str> for Actions {
    fn from(name: &str) -> Self {
        Self::parse(&[name])
    }
}

impl<const N: usize> From<[&str; N]> for Actions {
    fn from(names: [&str; N]) -> Self {
        Self::parse(&names)
    }
}

impl From<Vec<String>> for Actions {
    fn from(names: Vec<String>) -> Self {
        Self::parse(&names)
    }
}

/// Subject types a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subjects {
    /// Every subject type, spelled `"all"`
    All,
    Only(Vec<SubjectType>),
}

impl Subjects {
    pub fn only<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SubjectType>,
    {
        Self::Only(subjects.into_iter().map(Into::into).collect())
    }

    pub fn parse<S: AsRef<str>>(names: &[S]) -> Self {
        if names.iter().any(|n| n.as_ref() == ALL_SUBJECTS) {
            Self::All
        } else {
            Self::only(names.iter().map(|n| SubjectType::new(n.as_ref())))
        }
    }

    pub fn covers(&self, subject_type: &SubjectType) -> bool {
        match self {
            Self::All => true,
            Self::Only(subjects) => subjects.contains(subject_type),
        }
    }
}

impl From<&str> for Subjects {
    fn from(name: &str) -> Self {
        Self::parse(&[name])
    }
}

impl<const N: usize> From<[&str; N]> for Subjects {
    fn from(names: [&str; N]) -> Self {
        Self::parse(&names)
    }
}

impl From<Vec<String>> for Subjects {
    fn from(names: Vec<String>) -> Self {
        Self::parse(&names)
    }
}

/// Whether a rule adds or removes permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Grant,
    Revoke,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grant => write!(f, "grant"),
            Self::Revoke => write!(f, "revoke"),
        }
    }
}

/// A single comparable attribute value used in conditions and compiled filters
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Convert a JSON value, rejecting arrays and objects
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    /// Value equality against a single (non-collection) attribute value.
    /// Numbers compare by exact numeric value, so `1` equals `1.0`.
    pub fn equals(&self, actual: &Value) -> bool {
        match (self, actual) {
            (Self::Null, Value::Null) => true,
            (Self::Bool(a), Value::Bool(b)) => a == b,
            (Self::String(a), Value::String(b)) => a == b,
            (Self::Number(a), Value::Number(b)) => numbers_equal(a, b),
            _ => false,
        }
    }

    /// Membership in a collection-valued attribute
    pub fn is_element_of(&self, actual: &Value) -> bool {
        match actual {
            Value::Array(items) => items.iter().any(|item| self.equals(item)),
            _ => false,
        }
    }

    /// Equality for scalar attributes, membership for collection attributes
    pub fn equals_or_contained_in(&self, actual: &Value) -> bool {
        match actual {
            Value::Array(_) => self.is_element_of(actual),
            _ => self.equals(actual),
        }
    }
}

/// Exact numeric equality. An integer equals a float only when the float is
/// integral and converts to exactly that integer.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (a.is_f64(), b.is_f64()) {
        (true, true) => a.as_f64() == b.as_f64(),
        (true, false) => a.as_f64().is_some_and(|float| integer_equals_float(b, float)),
        (false, true) => b.as_f64().is_some_and(|float| integer_equals_float(a, float)),
        (false, false) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => matches!((a.as_u64(), b.as_u64()), (Some(a), Some(b)) if a == b),
        },
    }
}

// 2^63 and 2^64 are exact in f64
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

fn integer_equals_float(integer: &Number, float: f64) -> bool {
    if !float.is_finite() || float.fract() != 0.0 {
        return false;
    }
    if let Some(i) = integer.as_i64() {
        float >= -I64_BOUND && float < I64_BOUND && float as i64 == i
    } else if let Some(u) = integer.as_u64() {
        float >= 0.0 && float < U64_BOUND && float as u64 == u
    } else {
        false
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<f64> for Scalar {
    /// Non-finite floats have no JSON form and become `Null`
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

/// A persisted record of some subject type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub subject_type: SubjectType,
    pub id: String,
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(subject_type: SubjectType, id: &str, attributes: Map<String, Value>) -> Self {
        Self {
            subject_type,
            id: id.to_string(),
            attributes,
        }
    }

    /// Build a record from a JSON document, which must be an object
    pub fn from_json(subject_type: SubjectType, id: &str, document: Value) -> Result<Self> {
        match document {
            Value::Object(attributes) => Ok(Self::new(subject_type, id, attributes)),
            other => Err(AbilityError::InvalidRecord(format!(
                "attributes of {}#{} must be a JSON object, got {}",
                subject_type, id, other
            ))),
        }
    }

    /// Build a record from any serializable struct
    pub fn from_serializable<T: Serialize>(
        subject_type: SubjectType,
        id: &str,
        value: &T,
    ) -> Result<Self> {
        Self::from_json(subject_type, id, serde_json::to_value(value)?)
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.subject_type, self.id)
    }
}
