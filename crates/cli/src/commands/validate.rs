use std::path::Path;

use benefits_core::config::LoadOptions;
use benefits_core::rules::{Interpreter, RuleValidator};
use serde_json::Value;

use crate::commands::{load_config, read_input, CommandResult};

const COMMAND: &str = "validate";

pub fn run(options: LoadOptions, rule_path: &Path) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let rule: Value = match read_input(COMMAND, rule_path) {
        Ok(rule) => rule,
        Err(result) => return result,
    };

    let interpreter = Interpreter::from_config(&config.engine);
    let report = RuleValidator::from_config(&interpreter, &config.engine).validate(&rule);

    let message = if report.valid {
        format!("rule is valid ({} warnings)", report.warnings.len())
    } else {
        format!("rule has {} errors", report.errors.len())
    };
    CommandResult::report(COMMAND, report.valid, message, &report)
}
