use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::interpreter::Interpreter;
use crate::rules::tree::RuleTree;
use crate::rules::value::normalize_numbers;

/// A sample input shipped alongside an imported rule, with the result it must produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleTestCase {
    #[serde(default)]
    pub description: String,
    pub input: Value,
    pub expected: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleTestOutcome {
    pub description: String,
    pub passed: bool,
    pub expected: Value,
    pub actual: Option<Value>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RuleTestReport {
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<RuleTestOutcome>,
}

impl RuleTestReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub fn run_rule_tests(
    interpreter: &Interpreter,
    rule: &RuleTree,
    cases: &[RuleTestCase],
) -> RuleTestReport {
    let mut report = RuleTestReport::default();

    for case in cases {
        let outcome = match interpreter.evaluate(rule, &case.input) {
            Ok(actual) => RuleTestOutcome {
                description: case.description.clone(),
                passed: normalize_numbers(&actual) == normalize_numbers(&case.expected),
                expected: case.expected.clone(),
                actual: Some(actual),
                error: None,
            },
            Err(error) => RuleTestOutcome {
                description: case.description.clone(),
                passed: false,
                expected: case.expected.clone(),
                actual: None,
                error: Some(error.to_string()),
            },
        };

        if outcome.passed {
            report.passed += 1;
        } else {
            report.failed += 1;
        }
        report.results.push(outcome);
    }

    report
}
