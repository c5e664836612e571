pub mod config;
pub mod debug;
pub mod eligibility;
pub mod evaluate;
pub mod test;
pub mod validate;
pub mod walk;

use std::fs;
use std::path::Path;

use anyhow::Context;
use benefits_core::config::{AppConfig, LoadOptions};
use benefits_core::errors::ApplicationError;
use benefits_core::rules::RuleTree;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub const EXIT_OK: u8 = 0;
/// The command ran but the rule, test or flow did not hold up.
pub const EXIT_DOMAIN_FAILURE: u8 = 1;
pub const EXIT_CONFIG_FAILURE: u8 = 2;
pub const EXIT_INPUT_FAILURE: u8 = 3;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: EXIT_OK, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// A finished command carrying its report under `data`. A report that did not hold up
    /// (invalid rule, failing test case) is `status: "failed"` with the domain exit code.
    pub fn report<T: Serialize>(
        command: &str,
        passed: bool,
        message: impl Into<String>,
        data: &T,
    ) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), EXIT_INPUT_FAILURE)
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: if passed { "ok" } else { "failed" }.to_string(),
            error_class: (!passed).then(|| "domain".to_string()),
            message: message.into(),
            data: Some(data),
        };
        let exit_code = if passed { EXIT_OK } else { EXIT_DOMAIN_FAILURE };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn text(exit_code: u8, output: impl Into<String>) -> Self {
        Self { exit_code, output: output.into() }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Reports a core failure in its interface form: the user-facing text, then the detail.
pub(crate) fn application_failure(
    command: &str,
    error_class: &str,
    error: impl Into<ApplicationError>,
    exit_code: u8,
) -> CommandResult {
    let correlation_id = format!("{command}-{}", std::process::id());
    let interface = error.into().into_interface(correlation_id.as_str());
    tracing::warn!(
        event_name = "cli.command_failed",
        command,
        correlation_id = %correlation_id,
        error = %interface,
        "command failed"
    );
    CommandResult::failure(
        command,
        error_class,
        format!("{} ({interface})", interface.user_message()),
        exit_code,
    )
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        application_failure(
            command,
            "config_validation",
            ApplicationError::Configuration(error.to_string()),
            EXIT_CONFIG_FAILURE,
        )
    })
}

pub(crate) fn read_input<T: DeserializeOwned>(command: &str, path: &Path) -> Result<T, CommandResult> {
    parse_file(path).map_err(|error| {
        CommandResult::failure(command, "input", format!("{error:#}"), EXIT_INPUT_FAILURE)
    })
}

/// Reads an optional input file, defaulting to an empty JSON object.
pub(crate) fn read_context(command: &str, path: Option<&Path>) -> Result<Value, CommandResult> {
    match path {
        Some(path) => read_input(command, path),
        None => Ok(Value::Object(serde_json::Map::new())),
    }
}

pub(crate) fn parse_rule(command: &str, raw: &Value) -> Result<RuleTree, CommandResult> {
    RuleTree::parse(raw).map_err(|error| {
        CommandResult::failure(command, "rule_parse", error.to_string(), EXIT_INPUT_FAILURE)
    })
}

fn parse_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("could not parse `{}`", path.display()))
}
