use crate::{
    condition::{Condition, Conditions},
    error::{AbilityError, Result},
    filter::CompiledFilter,
    models::{Action, Actions, Polarity, Record, SubjectType, Subjects},
    rule::Rule,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Ordered collection of grant and revoke rules for one actor.
///
/// Rules are appended while declaring (`&mut self`) and only read while
/// evaluating (`&self`), so a populated set can be shared behind an `Arc`
/// across threads without locking. Evaluation does not depend on the order
/// rules were declared in.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,

    /// Alias action -> actions it stands for
    aliases: HashMap<Action, Vec<Action>>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    /// Empty rule set with the default aliases
    /// (`read` covers `index`/`show`, `create` covers `new`, `update` covers `edit`)
    pub fn new() -> Self {
        let mut rules = Self::without_default_aliases();
        rules.alias_action(["index", "show"], "read");
        rules.alias_action(["new"], "create");
        rules.alias_action(["edit"], "update");
        rules
    }

    pub fn without_default_aliases() -> Self {
        Self {
            rules: Vec::new(),
            aliases: HashMap::new(),
        }
    }

    // =============================================================================
    // Declaration
    // =============================================================================

    /// Make `target` stand for each of `actions` when rules are matched
    pub fn alias_action<I, S>(&mut self, actions: I, target: &str) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.aliases.entry(Action::new(target)).or_default();
        for action in actions {
            let action = Action::new(action.as_ref());
            if !entry.contains(&action) {
                entry.push(action);
            }
        }
        self
    }

    /// Declare a grant; chain `.when(..)` / `.matching(..)` to narrow it
    pub fn grant(
        &mut self,
        actions: impl Into<Actions>,
        subjects: impl Into<Subjects>,
    ) -> &mut Rule {
        self.push(Rule::grant(actions, subjects))
    }

    /// Declare a revoke; chain `.when(..)` to narrow it
    pub fn revoke(
        &mut self,
        actions: impl Into<Actions>,
        subjects: impl Into<Subjects>,
    ) -> &mut Rule {
        self.push(Rule::revoke(actions, subjects))
    }

    /// Append an already built rule
    pub fn push(&mut self, rule: Rule) -> &mut Rule {
        debug!("Declaring rule: {}", rule);
        self.rules.push(rule);
        self.rules
            .last_mut()
            .expect("rules must be non-empty (pushed above)")
    }

    /// Append another set's rules and aliases after this set's
    pub fn merge(&mut self, other: RuleSet) -> &mut Self {
        for (target, actions) in other.aliases {
            let entry = self.aliases.entry(target).or_default();
            for action in actions {
                if !entry.contains(&action) {
                    entry.push(action);
                }
            }
        }
        self.rules.extend(other.rules);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    // =============================================================================
    // Relevance
    // =============================================================================

    /// Every action `action` stands for, itself included, following aliases transitively
    pub fn expand_action(&self, action: &Action) -> HashSet<Action> {
        let mut expanded = HashSet::new();
        let mut pending = vec![action.clone()];
        while let Some(next) = pending.pop() {
            if expanded.insert(next.clone()) {
                if let Some(aliased) = self.aliases.get(&next) {
                    pending.extend(aliased.iter().cloned());
                }
            }
        }
        expanded
    }

    fn covers_action(&self, rule: &Rule, action: &Action) -> bool {
        match rule.actions() {
            Actions::All => true,
            Actions::Only(actions) => actions
                .iter()
                .any(|declared| declared == action || self.expand_action(declared).contains(action)),
        }
    }

    /// Rules whose subjects and actions cover the request, in declaration order
    pub fn relevant_rules<'a>(
        &'a self,
        action: &'a Action,
        subject_type: &'a SubjectType,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |rule| {
            rule.covers_subject(subject_type) && self.covers_action(rule, action)
        })
    }

    // =============================================================================
    // Instance Checks
    // =============================================================================

    /// Whether `action` is permitted on this record:
    /// some relevant grant matches and no relevant revoke matches.
    pub fn can_perform(&self, action: &Action, record: &Record) -> bool {
        let mut granted = false;
        for rule in self.relevant_rules(action, &record.subject_type) {
            if !rule.matches_record(record) {
                continue;
            }
            match rule.polarity() {
                Polarity::Revoke => {
                    debug!("{} denied on {} by: {}", action, record, rule);
                    return false;
                }
                Polarity::Grant => granted = true,
            }
        }
        debug!("{} on {} permitted: {}", action, record, granted);
        granted
    }

    /// Whether `action` could be permitted on some record of this type.
    /// Conditional revokes do not rule that out; only unconditional ones do.
    pub fn can_perform_on_type(&self, action: &Action, subject_type: &SubjectType) -> bool {
        let mut granted = false;
        for rule in self.relevant_rules(action, subject_type) {
            match rule.polarity() {
                Polarity::Revoke if rule.is_unconditional() => return false,
                Polarity::Revoke => {}
                Polarity::Grant => granted = true,
            }
        }
        granted
    }

    // =============================================================================
    // Collection Scope
    // =============================================================================

    /// Compile the relevant rules into a backend-neutral filter.
    ///
    /// Fails with [`AbilityError::UnsupportedRule`] when a relevant rule
    /// carries a predicate.
    pub fn filter_for(&self, action: &Action, subject_type: &SubjectType) -> Result<CompiledFilter> {
        let compilable = self
            .relevant_rules(action, subject_type)
            .map(|rule| {
                rule.compilable().ok_or_else(|| {
                    warn!("Cannot compile predicate rule for {} on {}: {}", action, subject_type, rule);
                    AbilityError::UnsupportedRule {
                        action: action.clone(),
                        subject_type: subject_type.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let filter = CompiledFilter::from_rules(&compilable);
        debug!(
            "Compiled {} rule(s) for {} on {}: {}",
            compilable.len(),
            action,
            subject_type,
            filter
        );
        Ok(filter)
    }

    /// Attribute values implied by the relevant grants' top-level equality
    /// conditions, later grants overriding earlier ones. Useful to pre-fill a
    /// new record the actor is allowed to create.
    pub fn attributes_for(&self, action: &Action, subject_type: &SubjectType) -> Map<String, Value> {
        let mut attributes = Map::new();
        for rule in self.relevant_rules(action, subject_type) {
            if rule.polarity() != Polarity::Grant {
                continue;
            }
            attributes.extend(scalar_equalities(rule.conditions()));
        }
        attributes
    }
}

fn scalar_equalities(conditions: &Conditions) -> impl Iterator<Item = (String, Value)> + '_ {
    conditions.iter().filter_map(|(attribute, condition)| match condition {
        Condition::Equals(value) => Some((attribute.clone(), value.to_json())),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FieldPath;
    use crate::models::Scalar;
    use serde_json::json;

    fn project(id: &str, attributes: Value) -> Record {
        Record::from_json(SubjectType::new("project"), id, attributes).unwrap()
    }

    fn read() -> Action {
        Action::new("read")
    }

    fn projects() -> SubjectType {
        SubjectType::new("project")
    }

    #[test]
    fn test_unconditioned_grant_permits() {
        let mut rules = RuleSet::new();
        rules.grant("read", "project");

        assert!(rules.can_perform(&read(), &project("1", json!({}))));
        assert!(!rules.can_perform(&Action::new("update"), &project("1", json!({}))));
    }

    #[test]
    fn test_revoke_without_grant_denies() {
        let mut rules = RuleSet::new();
        rules.revoke("read", "project").when(Conditions::new().equals("bar", 2));

        assert!(!rules.can_perform(&read(), &project("1", json!({"bar": 1}))));
        assert_eq!(rules.filter_for(&read(), &projects()).unwrap(), CompiledFilter::Never);
    }

    #[test]
    fn test_revoke_wins_regardless_of_order() {
        let record = project("1", json!({"bar": 2}));

        let mut grant_first = RuleSet::new();
        grant_first.grant("read", "project");
        grant_first.revoke("read", "project").when(Conditions::new().equals("bar", 2));

        let mut revoke_first = RuleSet::new();
        revoke_first.revoke("read", "project").when(Conditions::new().equals("bar", 2));
        revoke_first.grant("read", "project");

        assert!(!grant_first.can_perform(&read(), &record));
        assert!(!revoke_first.can_perform(&read(), &record));
        assert!(grant_first.can_perform(&read(), &project("2", json!({"bar": 1}))));
    }

    #[test]
    fn test_access_all_is_universal() {
        let mut rules = RuleSet::new();
        rules.grant("access", "all");

        assert!(rules.can_perform(&Action::new("destroy"), &project("1", json!({}))));
        let task = Record::from_json(SubjectType::new("task"), "t", json!({})).unwrap();
        assert!(rules.can_perform(&read(), &task));
        assert_eq!(
            rules.filter_for(&Action::new("destroy"), &SubjectType::new("task")).unwrap(),
            CompiledFilter::Or(vec![CompiledFilter::Always])
        );
    }

    #[test]
    fn test_aliases_expand_rule_actions() {
        let mut rules = RuleSet::new();
        rules.grant("read", "project");
        rules.alias_action(["comment"], "show");

        let record = project("1", json!({}));
        assert!(rules.can_perform(&Action::new("index"), &record));
        assert!(rules.can_perform(&Action::new("show"), &record));
        assert!(rules.can_perform(&Action::new("comment"), &record));
        assert!(!rules.can_perform(&Action::new("edit"), &record));

        let bare = {
            let mut rules = RuleSet::without_default_aliases();
            rules.grant("read", "project");
            rules
        };
        assert!(!bare.can_perform(&Action::new("index"), &record));
    }

    #[test]
    fn test_filter_union_and_subtraction() {
        let mut rules = RuleSet::new();
        rules.grant("read", "project").when(Conditions::new().equals("bar", 1));
        rules.grant("read", "project").when(Conditions::new().equals("bar", 2));
        rules.revoke("read", "project").when(Conditions::new().equals("bar", 2));

        let bar = |v: i64| CompiledFilter::FieldEquals(FieldPath::new(["bar"]), Scalar::from(v));
        assert_eq!(
            rules.filter_for(&read(), &projects()).unwrap(),
            CompiledFilter::And(vec![
                CompiledFilter::Or(vec![bar(1), bar(2)]),
                CompiledFilter::Not(Box::new(CompiledFilter::Or(vec![bar(2)]))),
            ])
        );
    }

    #[test]
    fn test_empty_grant_is_kept_in_union() {
        let mut rules = RuleSet::new();
        rules.grant("read", "project").when(Conditions::new().equals("title", "Sir"));
        rules.grant("read", "project");

        match rules.filter_for(&read(), &projects()).unwrap() {
            CompiledFilter::Or(grants) => {
                assert_eq!(grants.len(), 2);
                assert_eq!(grants[1], CompiledFilter::Always);
            }
            other => panic!("expected a union, got {}", other),
        }
    }

    #[test]
    fn test_predicate_rule_blocks_compilation_only() {
        let mut rules = RuleSet::new();
        rules.grant("read", "project").matching(|record| record.id == "1");

        assert!(rules.can_perform(&read(), &project("1", json!({}))));
        assert!(!rules.can_perform(&read(), &project("2", json!({}))));

        let err = rules.filter_for(&read(), &projects()).unwrap_err();
        assert!(matches!(err, AbilityError::UnsupportedRule { .. }));

        // Predicate rules for other actions do not get in the way
        assert!(rules.filter_for(&Action::new("update"), &projects()).is_ok());
    }

    #[test]
    fn test_type_level_check() {
        let mut rules = RuleSet::new();
        rules.grant("read", "project").when(Conditions::new().equals("bar", 1));
        rules.revoke("read", "project").when(Conditions::new().equals("bar", 2));
        assert!(rules.can_perform_on_type(&read(), &projects()));

        rules.revoke("read", "project");
        assert!(!rules.can_perform_on_type(&read(), &projects()));
        assert!(!rules.can_perform_on_type(&read(), &SubjectType::new("task")));
    }

    #[test]
    fn test_attributes_for() {
        let mut rules = RuleSet::new();
        rules.grant("create", "project").when(
            Conditions::new()
                .equals("owner", "alice")
                .any_of("state", ["draft", "open"])
                .nested("foo", Conditions::new().equals("bar", 1)),
        );
        rules.grant("create", "project").when(Conditions::new().equals("owner", "bob"));
        rules.revoke("create", "project").when(Conditions::new().equals("archived", true));

        let attributes = rules.attributes_for(&Action::new("create"), &projects());
        assert_eq!(Value::Object(attributes), json!({"owner": "bob"}));
    }

    #[test]
    fn test_declared_rule_is_the_one_returned() {
        let mut rules = RuleSet::new();
        rules.grant("read", "project");
        rules
            .revoke("read", "project")
            .when(Conditions::new().equals("bar", 2));

        assert_eq!(rules.rules().len(), 2);
        let last = &rules.rules()[1];
        assert_eq!(last.polarity(), Polarity::Revoke);
        assert_eq!(last.conditions(), &Conditions::new().equals("bar", 2));
        assert!(rules.rules()[0].is_unconditional());
    }

    #[test]
    fn test_merge() {
        let mut admin = RuleSet::without_default_aliases();
        admin.alias_action(["archive"], "manage_state");
        admin.grant("manage_state", "project");

        let mut rules = RuleSet::new();
        rules.grant("read", "project");
        rules.merge(admin);

        assert_eq!(rules.rules().len(), 2);
        assert!(rules.can_perform(&Action::new("archive"), &project("1", json!({}))));
        assert!(rules.can_perform(&Action::new("show"), &project("1", json!({}))));
    }
}
