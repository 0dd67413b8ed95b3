use crate::{
    condition::Conditions,
    models::{Action, Actions, Polarity, Record, SubjectType, Subjects, ALL_ACTIONS, ALL_SUBJECTS},
};
use std::fmt;
use std::sync::Arc;

/// Custom per-rule check, evaluated only against concrete records
pub type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// One grant or revoke statement
#[derive(Clone)]
pub struct Rule {
    polarity: Polarity,
    actions: Actions,
    subjects: Subjects,
    conditions: Conditions,
    predicate: Option<Predicate>,
}

impl Rule {
    pub fn new(polarity: Polarity, actions: Actions, subjects: Subjects) -> Self {
        Self {
            polarity,
            actions,
            subjects,
            conditions: Conditions::new(),
            predicate: None,
        }
    }

    pub fn grant(actions: impl Into<Actions>, subjects: impl Into<Subjects>) -> Self {
        Self::new(Polarity::Grant, actions.into(), subjects.into())
    }

    pub fn revoke(actions: impl Into<Actions>, subjects: impl Into<Subjects>) -> Self {
        Self::new(Polarity::Revoke, actions.into(), subjects.into())
    }

    /// Narrow the rule to records matching `conditions`
    pub fn when(&mut self, conditions: Conditions) -> &mut Self {
        self.conditions = conditions;
        self
    }

    /// Attach a custom predicate. Rules carrying one can still answer
    /// instance checks but can no longer be compiled to a query filter.
    pub fn matching<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    pub fn subjects(&self) -> &Subjects {
        &self.subjects
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Unconditional rules apply to every record they are relevant for
    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty() && self.predicate.is_none()
    }

    /// Relevance by subject type. Action relevance needs the alias table and
    /// lives on the rule set.
    pub fn covers_subject(&self, subject_type: &SubjectType) -> bool {
        self.subjects.covers(subject_type)
    }

    /// Conditions and predicate against a concrete record
    pub fn matches_record(&self, record: &Record) -> bool {
        self.conditions.matches(&record.attributes)
            && self.predicate.as_ref().map_or(true, |predicate| predicate(record))
    }

    /// View of this rule for filter compilation, unavailable when a
    /// predicate is attached
    pub fn compilable(&self) -> Option<CompilableRule<'_>> {
        if self.predicate.is_some() {
            return None;
        }
        Some(CompilableRule {
            polarity: self.polarity,
            conditions: &self.conditions,
        })
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("polarity", &self.polarity)
            .field("actions", &self.actions)
            .field("subjects", &self.subjects)
            .field("conditions", &self.conditions)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions = match &self.actions {
            Actions::All => ALL_ACTIONS.to_string(),
            Actions::Only(actions) => actions
                .iter()
                .map(Action::as_str)
                .collect::<Vec<_>>()
                .join(","),
        };
        let subjects = match &self.subjects {
            Subjects::All => ALL_SUBJECTS.to_string(),
            Subjects::Only(subjects) => subjects
                .iter()
                .map(SubjectType::as_str)
                .collect::<Vec<_>>()
                .join(","),
        };
        write!(f, "{} {} on {} {}", self.polarity, actions, subjects, self.conditions)?;
        if self.predicate.is_some() {
            write!(f, " +predicate")?;
        }
        Ok(())
    }
}

/// A rule proven free of predicates. Only these reach the filter compiler.
#[derive(Debug, Clone, Copy)]
pub struct CompilableRule<'a> {
    polarity: Polarity,
    conditions: &'a Conditions,
}

impl<'a> CompilableRule<'a> {
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn conditions(&self) -> &'a Conditions {
        self.conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(attributes: serde_json::Value) -> Record {
        Record::from_json(SubjectType::new("project"), "1", attributes).unwrap()
    }

    #[test]
    fn test_conditions_and_predicate_both_apply() {
        let mut rule = Rule::grant("read", "project");
        rule.when(Conditions::new().equals("title", "Sir"))
            .matching(|record| record.get("published") == Some(&json!(true)));

        assert!(rule.matches_record(&project(json!({"title": "Sir", "published": true}))));
        assert!(!rule.matches_record(&project(json!({"title": "Sir", "published": false}))));
        assert!(!rule.matches_record(&project(json!({"title": "Dude", "published": true}))));
    }

    #[test]
    fn test_predicate_rules_are_not_compilable() {
        let mut rule = Rule::grant("read", "project");
        assert!(rule.compilable().is_some());

        rule.matching(|_| true);
        assert!(rule.compilable().is_none());
        assert!(!rule.is_unconditional());
    }

    #[test]
    fn test_display() {
        let mut rule = Rule::revoke(["read", "update"], "project");
        rule.when(Conditions::new().equals("bar", 2));
        assert_eq!(rule.to_string(), "revoke read,update on project {bar: 2}");
        assert_eq!(Rule::grant("access", "all").to_string(), "grant access on all {}");
    }
}
