//! Backend-neutral filter algebra produced by collection-scope resolution
//!
//! Adapters pattern-match [`CompiledFilter`] into their native query syntax.
//! [`CompiledFilter::evaluate`] is the reference semantics every translation
//! must agree with; it shares its leaf comparisons with the condition matcher.

use crate::{
    condition::{Condition, Conditions},
    models::{Polarity, Scalar},
    rule::CompilableRule,
};
use serde_json::{Map, Value};
use std::fmt;

/// Dotted path into a record's attributes, one segment per nesting level
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// Walk nested objects. Fails on a missing key or a non-object step.
    pub fn resolve<'a>(&self, attributes: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let mut current = attributes.get(first)?;
        for segment in rest {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Compiled permission filter
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledFilter {
    Always,
    Never,
    /// Equality, or membership when the field holds a collection
    FieldEquals(FieldPath, Scalar),
    /// The field is a collection holding the value
    FieldContains(FieldPath, Scalar),
    And(Vec<CompiledFilter>),
    Or(Vec<CompiledFilter>),
    Not(Box<CompiledFilter>),
}

impl CompiledFilter {
    /// Combine resolved rules: (OR of grants) AND NOT (OR of revokes).
    ///
    /// No grants compiles to [`CompiledFilter::Never`]. Grants with empty
    /// conditions compile to [`CompiledFilter::Always`] and are kept alongside
    /// the others.
    pub fn from_rules(rules: &[CompilableRule<'_>]) -> Self {
        let compile = |polarity: Polarity| -> Vec<CompiledFilter> {
            rules
                .iter()
                .filter(|rule| rule.polarity() == polarity)
                .map(|rule| Self::from_conditions(rule.conditions()))
                .collect()
        };

        let grants = compile(Polarity::Grant);
        if grants.is_empty() {
            return Self::Never;
        }

        let granted = Self::Or(grants);
        let revokes = compile(Polarity::Revoke);
        if revokes.is_empty() {
            granted
        } else {
            Self::And(vec![granted, Self::Not(Box::new(Self::Or(revokes)))])
        }
    }

    /// Compile one condition specification. Empty conditions compile to `Always`.
    pub fn from_conditions(conditions: &Conditions) -> Self {
        Self::compile_under(conditions, &FieldPath(Vec::new()))
    }

    fn compile_under(conditions: &Conditions, prefix: &FieldPath) -> Self {
        let mut clauses: Vec<CompiledFilter> = conditions
            .iter()
            .map(|(attribute, condition)| {
                let path = prefix.child(attribute);
                match condition {
                    Condition::Equals(value) => Self::FieldEquals(path, value.clone()),
                    Condition::AnyOf(values) => Self::Or(
                        values
                            .iter()
                            .map(|value| Self::FieldEquals(path.clone(), value.clone()))
                            .collect(),
                    ),
                    Condition::Contains(value) => Self::FieldContains(path, value.clone()),
                    Condition::Nested(inner) => Self::compile_under(inner, &path),
                }
            })
            .collect();

        match clauses.len() {
            0 => Self::Always,
            1 => clauses.remove(0),
            _ => Self::And(clauses),
        }
    }

    /// Evaluate against a record's attributes
    pub fn evaluate(&self, attributes: &Map<String, Value>) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::FieldEquals(path, value) => path
                .resolve(attributes)
                .is_some_and(|actual| value.equals_or_contained_in(actual)),
            Self::FieldContains(path, value) => path
                .resolve(attributes)
                .is_some_and(|actual| value.is_element_of(actual)),
            Self::And(filters) => filters.iter().all(|f| f.evaluate(attributes)),
            Self::Or(filters) => filters.iter().any(|f| f.evaluate(attributes)),
            Self::Not(filter) => !filter.evaluate(attributes),
        }
    }

    /// True if the filter uses collection containment anywhere
    pub fn uses_containment(&self) -> bool {
        match self {
            Self::FieldContains(..) => true,
            Self::And(filters) | Self::Or(filters) => filters.iter().any(Self::uses_containment),
            Self::Not(filter) => filter.uses_containment(),
            Self::Always | Self::Never | Self::FieldEquals(..) => false,
        }
    }
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "ALWAYS"),
            Self::Never => write!(f, "NEVER"),
            Self::FieldEquals(path, value) => write!(f, "{} = {}", path, value),
            Self::FieldContains(path, value) => write!(f, "{} CONTAINS {}", path, value),
            Self::And(filters) => write_joined(f, filters, "AND"),
            Self::Or(filters) => write_joined(f, filters, "OR"),
            Self::Not(filter) => write!(f, "NOT {}", filter),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, filters: &[CompiledFilter], op: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", op)?;
        }
        write!(f, "{}", filter)?;
    }
    write!(f, ")")
}
