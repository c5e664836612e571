use std::path::Path;

use benefits_core::config::LoadOptions;
use benefits_core::rules::{format_trace, DebugTracer, Interpreter};
use serde_json::Value;

use crate::commands::{
    load_config, read_context, read_input, CommandResult, EXIT_DOMAIN_FAILURE, EXIT_OK,
};

const COMMAND: &str = "debug";

/// Prints an indented evaluation trace, or the full report as JSON.
pub fn run(options: LoadOptions, rule_path: &Path, data_path: Option<&Path>, json: bool) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let rule: Value = match read_input(COMMAND, rule_path) {
        Ok(rule) => rule,
        Err(result) => return result,
    };
    let data = match read_context(COMMAND, data_path) {
        Ok(data) => data,
        Err(result) => return result,
    };

    let interpreter = Interpreter::from_config(&config.engine);
    let report = DebugTracer::new(&interpreter).debug_json(&rule, &data);

    if json {
        let message = format!("{} trace steps", report.trace.len());
        return CommandResult::report(COMMAND, report.success, message, &report);
    }

    let exit_code = if report.success { EXIT_OK } else { EXIT_DOMAIN_FAILURE };
    CommandResult::text(exit_code, format_trace(&report))
}
