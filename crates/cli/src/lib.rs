pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use benefits_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "benefits",
    about = "Benefits eligibility rules and questionnaire CLI",
    long_about = "Validate, evaluate, debug and test eligibility rules, walk questionnaire flows, and run eligibility checks against a store document.",
    after_help = "Examples:\n  benefits validate rule.json\n  benefits test rule.json --cases cases.json\n  benefits evaluate rule.json --data household.json --details\n  benefits walk flow.json --answers answers.json\n  benefits eligibility --store store.json --profile household-1"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a benefits.toml config file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Treat absent variables as evaluation errors")]
    strict: bool,

    #[arg(long, global = true, help = "Override the configured log level")]
    log_level: Option<String>,

    #[arg(long, global = true, help = "Override the configured log format (compact|pretty|json)")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Check a rule's structure and report operators, variables and complexity")]
    Validate { rule: PathBuf },
    #[command(about = "Evaluate a rule against a JSON data context")]
    Evaluate {
        rule: PathBuf,
        #[arg(long, help = "JSON file with the data context")]
        data: Option<PathBuf>,
        #[arg(long, help = "Report per-criterion results")]
        details: bool,
    },
    #[command(about = "Trace a rule evaluation step by step")]
    Debug {
        rule: PathBuf,
        #[arg(long, help = "JSON file with the data context")]
        data: Option<PathBuf>,
        #[arg(long, help = "Emit the full report as JSON")]
        json: bool,
    },
    #[command(about = "Run sample cases against a rule")]
    Test {
        rule: PathBuf,
        #[arg(long, help = "JSON array of {description, input, expected} cases")]
        cases: PathBuf,
    },
    #[command(about = "Walk a questionnaire flow from start to end")]
    Walk {
        flow: PathBuf,
        #[arg(long, help = "JSON object of answers keyed by question id")]
        answers: Option<PathBuf>,
        #[arg(long, help = "JSON array of skip rules")]
        skip_rules: Option<PathBuf>,
    },
    #[command(about = "Evaluate a household's eligibility from a store document")]
    Eligibility {
        #[arg(long, help = "JSON document with profiles, programs and rules")]
        store: PathBuf,
        #[arg(long, help = "Household profile id")]
        profile: String,
        #[arg(long = "program", help = "Program id; repeat for several, omit for all")]
        programs: Vec<String>,
        #[arg(long, help = "Reference date for age calculations (YYYY-MM-DD)")]
        as_of: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                strict_variables: self.strict.then_some(true),
                max_depth: None,
                log_level: self.log_level.clone(),
                log_format: self.log_format,
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Validate { rule } => commands::validate::run(options, &rule),
        Command::Evaluate { rule, data, details } => {
            commands::evaluate::run(options, &rule, data.as_deref(), details)
        }
        Command::Debug { rule, data, json } => {
            commands::debug::run(options, &rule, data.as_deref(), json)
        }
        Command::Test { rule, cases } => commands::test::run(options, &rule, &cases),
        Command::Walk { flow, answers, skip_rules } => {
            commands::walk::run(options, &flow, answers.as_deref(), skip_rules.as_deref())
        }
        Command::Eligibility { store, profile, programs, as_of } => {
            commands::eligibility::run(options, &store, &profile, &programs, as_of.as_deref())
        }
        Command::Config => commands::config::run(options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the command payload.
fn init_logging(config: &AppConfig) {
    use LogFormat::{Compact, Json, Pretty};

    let filter = log_filter(config, std::env::var("RUST_LOG").ok().as_deref());
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

/// `RUST_LOG` directives win over the configured level when they parse.
fn log_filter(config: &AppConfig, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(config.logging.level.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
