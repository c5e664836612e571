use std::path::Path;

use benefits_core::config::LoadOptions;
use benefits_core::rules::{DetailedEvaluator, Interpreter};
use serde::Serialize;
use serde_json::Value;

use crate::commands::{
    application_failure, load_config, parse_rule, read_context, read_input, CommandResult,
    EXIT_DOMAIN_FAILURE,
};

const COMMAND: &str = "evaluate";

#[derive(Debug, Serialize)]
struct EvaluationPayload {
    result: Value,
}

/// Evaluates a rule against a data context. With `details`, reports per-criterion results
/// instead of the bare value.
pub fn run(options: LoadOptions, rule_path: &Path, data_path: Option<&Path>, details: bool) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let raw: Value = match read_input(COMMAND, rule_path) {
        Ok(raw) => raw,
        Err(result) => return result,
    };
    let rule = match parse_rule(COMMAND, &raw) {
        Ok(rule) => rule,
        Err(result) => return result,
    };
    let data = match read_context(COMMAND, data_path) {
        Ok(data) => data,
        Err(result) => return result,
    };

    let interpreter = Interpreter::from_config(&config.engine);

    if details {
        let evaluation = DetailedEvaluator::new(&interpreter).evaluate_with_details(&rule, &data);
        let message = match &evaluation.error {
            Some(error) => format!("evaluation failed: {error}"),
            None => format!("evaluated to {}", evaluation.result),
        };
        return CommandResult::report(COMMAND, evaluation.success, message, &evaluation);
    }

    match interpreter.evaluate(&rule, &data) {
        Ok(result) => CommandResult::report(
            COMMAND,
            true,
            format!("evaluated to {result}"),
            &EvaluationPayload { result },
        ),
        Err(error) => application_failure(COMMAND, "evaluation", error, EXIT_DOMAIN_FAILURE),
    }
}
