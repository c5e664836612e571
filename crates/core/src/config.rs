use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "benefits.toml";
pub const NESTED_CONFIG_FILE: &str = "config/benefits.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub questionnaire: QuestionnaireConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub strict_variables: bool,
    pub max_depth: usize,
    pub complexity_warning_threshold: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestionnaireConfig {
    /// Share of the blended progress percentage contributed by required questions.
    pub required_weight_pct: u8,
    pub seconds_per_question: u32,
    pub max_checkpoints: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub strict_variables: Option<bool>,
    pub max_depth: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { strict_variables: false, max_depth: 64, complexity_warning_threshold: 50 }
    }
}

impl Default for QuestionnaireConfig {
    fn default() -> Self {
        Self { required_weight_pct: 70, seconds_per_question: 30, max_checkpoints: 20 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(strict_variables) = engine.strict_variables {
                self.engine.strict_variables = strict_variables;
            }
            if let Some(max_depth) = engine.max_depth {
                self.engine.max_depth = max_depth;
            }
            if let Some(threshold) = engine.complexity_warning_threshold {
                self.engine.complexity_warning_threshold = threshold;
            }
        }

        if let Some(questionnaire) = patch.questionnaire {
            if let Some(weight) = questionnaire.required_weight_pct {
                self.questionnaire.required_weight_pct = weight;
            }
            if let Some(seconds) = questionnaire.seconds_per_question {
                self.questionnaire.seconds_per_question = seconds;
            }
            if let Some(max_checkpoints) = questionnaire.max_checkpoints {
                self.questionnaire.max_checkpoints = max_checkpoints;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BENEFITS_ENGINE_STRICT_VARIABLES") {
            self.engine.strict_variables = parse_bool("BENEFITS_ENGINE_STRICT_VARIABLES", &value)?;
        }
        if let Some(value) = read_env("BENEFITS_ENGINE_MAX_DEPTH") {
            self.engine.max_depth = parse_usize("BENEFITS_ENGINE_MAX_DEPTH", &value)?;
        }
        if let Some(value) = read_env("BENEFITS_ENGINE_COMPLEXITY_WARNING_THRESHOLD") {
            self.engine.complexity_warning_threshold =
                parse_u32("BENEFITS_ENGINE_COMPLEXITY_WARNING_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("BENEFITS_QUESTIONNAIRE_REQUIRED_WEIGHT_PCT") {
            self.questionnaire.required_weight_pct =
                parse_u8("BENEFITS_QUESTIONNAIRE_REQUIRED_WEIGHT_PCT", &value)?;
        }
        if let Some(value) = read_env("BENEFITS_QUESTIONNAIRE_SECONDS_PER_QUESTION") {
            self.questionnaire.seconds_per_question =
                parse_u32("BENEFITS_QUESTIONNAIRE_SECONDS_PER_QUESTION", &value)?;
        }
        if let Some(value) = read_env("BENEFITS_QUESTIONNAIRE_MAX_CHECKPOINTS") {
            self.questionnaire.max_checkpoints =
                parse_usize("BENEFITS_QUESTIONNAIRE_MAX_CHECKPOINTS", &value)?;
        }

        let log_level =
            read_env("BENEFITS_LOGGING_LEVEL").or_else(|| read_env("BENEFITS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BENEFITS_LOGGING_FORMAT").or_else(|| read_env("BENEFITS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(strict_variables) = overrides.strict_variables {
            self.engine.strict_variables = strict_variables;
        }
        if let Some(max_depth) = overrides.max_depth {
            self.engine.max_depth = max_depth;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;
        validate_questionnaire(&self.questionnaire)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.max_depth == 0 || engine.max_depth > 512 {
        return Err(ConfigError::Validation("engine.max_depth must be in range 1..=512".to_string()));
    }

    if engine.complexity_warning_threshold == 0 {
        return Err(ConfigError::Validation(
            "engine.complexity_warning_threshold must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_questionnaire(questionnaire: &QuestionnaireConfig) -> Result<(), ConfigError> {
    if !(50..=100).contains(&questionnaire.required_weight_pct) {
        return Err(ConfigError::Validation(
            "questionnaire.required_weight_pct must be in range 50..=100 so required questions \
             weigh at least as much as optional ones"
                .to_string(),
        ));
    }

    if questionnaire.seconds_per_question == 0 {
        return Err(ConfigError::Validation(
            "questionnaire.seconds_per_question must be greater than zero".to_string(),
        ));
    }

    if questionnaire.max_checkpoints == 0 {
        return Err(ConfigError::Validation(
            "questionnaire.max_checkpoints must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.trim().parse::<u8>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    questionnaire: Option<QuestionnairePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    strict_variables: Option<bool>,
    max_depth: Option<usize>,
    complexity_warning_threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct QuestionnairePatch {
    required_weight_pct: Option<u8>,
    seconds_per_question: Option<u32>,
    max_checkpoints: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
