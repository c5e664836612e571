use std::path::Path;

use benefits_core::config::LoadOptions;
use benefits_core::rules::{
    run_rule_tests, Interpreter, RuleTestCase, RuleTestReport, RuleValidator, ValidationReport,
};
use serde::Serialize;
use serde_json::Value;

use crate::commands::{load_config, parse_rule, read_input, CommandResult};

const COMMAND: &str = "test";

#[derive(Debug, Serialize)]
struct TestPayload {
    validation: ValidationReport,
    tests: Option<RuleTestReport>,
}

/// Runs the sample cases shipped with an imported rule. The rule is validated first and the
/// cases are skipped when it is structurally broken.
pub fn run(options: LoadOptions, rule_path: &Path, cases_path: &Path) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let raw: Value = match read_input(COMMAND, rule_path) {
        Ok(raw) => raw,
        Err(result) => return result,
    };
    let cases: Vec<RuleTestCase> = match read_input(COMMAND, cases_path) {
        Ok(cases) => cases,
        Err(result) => return result,
    };

    let interpreter = Interpreter::from_config(&config.engine);
    let validation = RuleValidator::from_config(&interpreter, &config.engine).validate(&raw);
    if !validation.valid {
        let message = format!("rule has {} errors; tests were not run", validation.errors.len());
        return CommandResult::report(
            COMMAND,
            false,
            message,
            &TestPayload { validation, tests: None },
        );
    }

    let rule = match parse_rule(COMMAND, &raw) {
        Ok(rule) => rule,
        Err(result) => return result,
    };
    let report = run_rule_tests(&interpreter, &rule, &cases);
    let passed = report.all_passed();
    let message = format!("{} passed, {} failed", report.passed, report.failed);

    CommandResult::report(COMMAND, passed, message, &TestPayload { validation, tests: Some(report) })
}
