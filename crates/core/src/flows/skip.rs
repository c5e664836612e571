use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::{Interpreter, RuleTree};

/// Skips every question in `targets` while `condition` holds, independent of each node's own
/// show-if condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkipRule {
    pub id: String,
    pub condition: RuleTree,
    pub targets: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SkipRule {
    pub fn new<I, S>(id: impl Into<String>, condition: RuleTree, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            condition,
            targets: targets.into_iter().map(Into::into).collect(),
            description: None,
        }
    }
}

/// Skip rules are evaluated fresh on every query; nothing is cached between calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipLogicManager {
    rules: Vec<SkipRule>,
}

impl SkipLogicManager {
    pub fn new(rules: Vec<SkipRule>) -> Self {
        Self { rules }
    }

    /// Adds a rule, replacing any rule with the same id.
    pub fn add_rule(&mut self, rule: SkipRule) {
        match self.rules.iter_mut().find(|existing| existing.id == rule.id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.id != id);
        self.rules.len() != before
    }

    pub fn rules(&self) -> &[SkipRule] {
        &self.rules
    }

    pub fn skipped_questions(&self, interpreter: &Interpreter, context: &Value) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|rule| interpreter.evaluate_condition(&rule.condition, context))
            .flat_map(|rule| rule.targets.iter().cloned())
            .collect()
    }

    pub fn should_skip(&self, question_id: &str, interpreter: &Interpreter, context: &Value) -> bool {
        self.rules.iter().any(|rule| {
            rule.targets.iter().any(|target| target == question_id)
                && interpreter.evaluate_condition(&rule.condition, context)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{SkipLogicManager, SkipRule};
    use crate::rules::{Interpreter, RuleTree};

    fn renter_rule() -> SkipRule {
        SkipRule::new(
            "no-rent",
            RuleTree::parse(&json!({"==": [{"var": "housing"}, "own"]})).expect("valid rule"),
            ["rentAmount", "landlordName"],
        )
    }

    #[test]
    fn satisfied_rules_name_their_targets() {
        let mut manager = SkipLogicManager::default();
        manager.add_rule(renter_rule());
        let interpreter = Interpreter::default();

        let owners = manager.skipped_questions(&interpreter, &json!({"housing": "own"}));
        assert_eq!(owners.into_iter().collect::<Vec<_>>(), vec!["landlordName", "rentAmount"]);
        assert!(manager.should_skip("rentAmount", &interpreter, &json!({"housing": "own"})));
        assert!(!manager.should_skip("rentAmount", &interpreter, &json!({"housing": "rent"})));
    }

    #[test]
    fn conditions_are_reevaluated_on_every_call() {
        let manager = SkipLogicManager::new(vec![renter_rule()]);
        let interpreter = Interpreter::default();

        assert!(manager.should_skip("landlordName", &interpreter, &json!({"housing": "own"})));
        assert!(!manager.should_skip("landlordName", &interpreter, &json!({"housing": "rent"})));
    }

    #[test]
    fn rules_are_replaced_and_removed_by_id() {
        let mut manager = SkipLogicManager::default();
        manager.add_rule(renter_rule());
        manager.add_rule(renter_rule());
        assert_eq!(manager.rules().len(), 1);

        assert!(manager.remove_rule("no-rent"));
        assert!(!manager.remove_rule("no-rent"));
        assert!(manager.skipped_questions(&Interpreter::default(), &json!({})).is_empty());
    }

    #[test]
    fn broken_conditions_skip_nothing() {
        let manager = SkipLogicManager::new(vec![SkipRule::new(
            "broken",
            RuleTree::op("frobnicate", vec![]),
            ["q1"],
        )]);
        assert!(!manager.should_skip("q1", &Interpreter::default(), &json!({})));
    }
}
