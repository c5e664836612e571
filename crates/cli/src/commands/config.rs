use std::env;
use std::fs;
use std::path::Path;

use benefits_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG_FAILURE, EXIT_OK};

struct Field<'a> {
    key_path: &'static str,
    value: String,
    env_keys: &'a [&'static str],
    overridden: bool,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_path = resolve_config_path(options.config_path.as_deref());
    let overrides = options.overrides.clone();

    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::text(
                EXIT_CONFIG_FAILURE,
                format!("config validation failed: {error}"),
            )
        }
    };

    let config_file_doc = load_config_file_doc(config_path.as_deref());

    let fields = [
        Field {
            key_path: "engine.strict_variables",
            value: config.engine.strict_variables.to_string(),
            env_keys: &["BENEFITS_ENGINE_STRICT_VARIABLES"],
            overridden: overrides.strict_variables.is_some(),
        },
        Field {
            key_path: "engine.max_depth",
            value: config.engine.max_depth.to_string(),
            env_keys: &["BENEFITS_ENGINE_MAX_DEPTH"],
            overridden: overrides.max_depth.is_some(),
        },
        Field {
            key_path: "engine.complexity_warning_threshold",
            value: config.engine.complexity_warning_threshold.to_string(),
            env_keys: &["BENEFITS_ENGINE_COMPLEXITY_WARNING_THRESHOLD"],
            overridden: false,
        },
        Field {
            key_path: "questionnaire.required_weight_pct",
            value: config.questionnaire.required_weight_pct.to_string(),
            env_keys: &["BENEFITS_QUESTIONNAIRE_REQUIRED_WEIGHT_PCT"],
            overridden: false,
        },
        Field {
            key_path: "questionnaire.seconds_per_question",
            value: config.questionnaire.seconds_per_question.to_string(),
            env_keys: &["BENEFITS_QUESTIONNAIRE_SECONDS_PER_QUESTION"],
            overridden: false,
        },
        Field {
            key_path: "questionnaire.max_checkpoints",
            value: config.questionnaire.max_checkpoints.to_string(),
            env_keys: &["BENEFITS_QUESTIONNAIRE_MAX_CHECKPOINTS"],
            overridden: false,
        },
        Field {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["BENEFITS_LOGGING_LEVEL", "BENEFITS_LOG_LEVEL"],
            overridden: overrides.log_level.is_some(),
        },
        Field {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["BENEFITS_LOGGING_FORMAT", "BENEFITS_LOG_FORMAT"],
            overridden: overrides.log_format.is_some(),
        },
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(field, config_file_doc.as_ref(), config_path.as_deref());
        lines.push(render_line(field.key_path, &field.value, source));
    }

    CommandResult::text(EXIT_OK, lines.join("\n"))
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field<'_>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if field.overridden {
        return "flag".to_string();
    }

    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
