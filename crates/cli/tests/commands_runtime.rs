use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use benefits_cli::commands::{config, debug, eligibility, evaluate, test, validate, walk};
use benefits_core::config::LoadOptions;
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn validate_reports_operators_and_variables() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(
            &dir,
            "rule.json",
            json!({"and": [{">": [{"var": "age"}, 18]}, {"<=": [{"var": "householdIncome"}, 4000]}]}),
        );

        let result = validate::run(LoadOptions::default(), &rule);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "validate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["valid"], true);
        assert_eq!(payload["data"]["variables"], json!(["age", "householdIncome"]));
    });
}

#[test]
fn validate_flags_unknown_operators_as_domain_failure() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(&dir, "rule.json", json!({"frobnicate": [1, 2]}));

        let result = validate::run(LoadOptions::default(), &rule);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "failed");
        assert_eq!(payload["error_class"], "domain");
        assert_eq!(payload["data"]["valid"], false);
    });
}

#[test]
fn evaluate_returns_the_rule_result() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(&dir, "rule.json", json!({">": [{"var": "age"}, 18]}));
        let data = write_json(&dir, "data.json", json!({"age": 25}));

        let result = evaluate::run(LoadOptions::default(), &rule, Some(&data), false);
        assert_eq!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["data"]["result"], true);
    });
}

#[test]
fn evaluate_with_details_reports_criteria() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(&dir, "rule.json", json!({"<=": [{"var": "householdIncome"}, 4000]}));
        let data = write_json(&dir, "data.json", json!({"householdIncome": 4167}));

        let result = evaluate::run(LoadOptions::default(), &rule, Some(&data), true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["result"], false);
        let criterion = &payload["data"]["criteria"][0];
        assert_eq!(criterion["value"], 4167);
        assert_eq!(criterion["threshold"], 4000);
        assert_eq!(criterion["comparison"], "<=");
        assert_eq!(criterion["met"], false);
    });
}

#[test]
fn evaluate_rejects_unreadable_input() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("missing.json");

        let result = evaluate::run(LoadOptions::default(), &missing, None, false);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "input");
    });
}

#[test]
fn strict_mode_turns_absent_variables_into_failures() {
    with_env(&[("BENEFITS_ENGINE_STRICT_VARIABLES", "true")], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(&dir, "rule.json", json!({">": [{"var": "age"}, 18]}));

        let result = evaluate::run(LoadOptions::default(), &rule, None, false);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "evaluation");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("The information provided could not be processed."));
        assert!(message.contains("bad request: "));
    });
}

#[test]
fn debug_renders_a_text_trace() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(&dir, "rule.json", json!({"between": [{"var": "age"}, 18, 65]}));
        let data = write_json(&dir, "data.json", json!({"age": 70}));

        let result = debug::run(LoadOptions::default(), &rule, Some(&data), false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("between"));
        assert!(last_line(&result.output).starts_with("result false"));

        let json_result = debug::run(LoadOptions::default(), &rule, Some(&data), true);
        let payload = parse_payload(&json_result.output);
        assert_eq!(payload["data"]["result"], false);
        assert_eq!(payload["data"]["variables_accessed"], json!(["age"]));
    });
}

#[test]
fn test_runs_packaged_cases() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(&dir, "rule.json", json!({">=": [{"var": "age"}, 65]}));
        let cases = write_json(
            &dir,
            "cases.json",
            json!([
                {"description": "senior", "input": {"age": 70}, "expected": true},
                {"description": "adult", "input": {"age": 40}, "expected": true}
            ]),
        );

        let result = test::run(LoadOptions::default(), &rule, &cases);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "1 passed, 1 failed");
        assert_eq!(payload["data"]["tests"]["results"][1]["passed"], false);
    });
}

#[test]
fn walk_skips_hidden_questions_and_completes() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let flow = write_json(
            &dir,
            "flow.json",
            json!({
                "id": "household",
                "start": "node1",
                "nodes": [
                    {"id": "node1", "question_id": "hasChildren", "next": "node2"},
                    {"id": "node2", "question_id": "childCount", "next": "node3",
                     "show_if": {"==": [{"var": "hasChildren"}, true]}},
                    {"id": "node3", "question_id": "income"}
                ]
            }),
        );
        let answers =
            write_json(&dir, "answers.json", json!({"hasChildren": false, "income": 2400}));

        let result = walk::run(LoadOptions::default(), &flow, Some(&answers), None);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["state"], "completed");
        assert_eq!(payload["data"]["path"], json!(["node1", "node3"]));
        assert_eq!(payload["data"]["questions_skipped"], json!(["childCount"]));
        assert_eq!(payload["data"]["progress"]["progress_percent"], 100);
    });
}

#[test]
fn walk_rejects_dangling_targets() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let flow = write_json(
            &dir,
            "flow.json",
            json!({"id": "broken", "start": "a", "nodes": [{"id": "a", "question_id": "qa", "next": "zzz"}]}),
        );

        let result = walk::run(LoadOptions::default(), &flow, None, None);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "flow_graph");
    });
}

#[test]
fn eligibility_converts_income_and_explains_the_outcome() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let store = write_json(
            &dir,
            "store.json",
            json!({
                "profiles": [{"id": "household-1", "fields": {"householdIncome": 50000}}],
                "programs": [{"id": "snap", "name": "Food assistance"}],
                "rules": [{
                    "id": "snap-income",
                    "program_id": "snap",
                    "name": "Income limit",
                    "logic": {"<=": [{"var": "householdIncome"}, 4000]},
                    "required_fields": ["householdIncome"]
                }]
            }),
        );

        let result = eligibility::run(LoadOptions::default(), &store, "household-1", &[], None);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let snap = &payload["data"]["results"][0];
        assert_eq!(snap["eligible"], false);
        assert_eq!(snap["confidence"], 95);
        assert_eq!(snap["criteria"][0]["value"], 4167);
        assert_eq!(snap["criteria"][0]["met"], false);
    });
}

#[test]
fn eligibility_reports_unknown_programs_as_fallbacks() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let store = write_json(
            &dir,
            "store.json",
            json!({"profiles": [{"id": "household-1", "fields": {}}]}),
        );

        let result = eligibility::run(
            LoadOptions::default(),
            &store,
            "household-1",
            &["tanf".to_string()],
            Some("2024-06-15"),
        );
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        let tanf = &payload["data"]["results"][0];
        assert_eq!(tanf["confidence"], 0);
        assert_eq!(tanf["needs_review"], true);
    });
}

#[test]
fn config_attributes_env_and_file_sources() {
    with_env(&[("BENEFITS_LOG_LEVEL", "debug")], || {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("benefits.toml");
        fs::write(&path, "[engine]\nmax_depth = 32\n").expect("write config");

        let options = LoadOptions { config_path: Some(path), ..LoadOptions::default() };
        let result = config::run(options);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("- engine.max_depth = 32 (source: file ("));
        assert!(result.output.contains("- logging.level = debug (source: env (BENEFITS_LOG_LEVEL))"));
        assert!(result.output.contains("- engine.strict_variables = false (source: default)"));
    });
}

#[test]
fn config_failures_use_the_config_exit_code() {
    with_env(&[("BENEFITS_ENGINE_MAX_DEPTH", "0")], || {
        let dir = TempDir::new().expect("temp dir");
        let rule = write_json(&dir, "rule.json", json!(true));

        let result = validate::run(LoadOptions::default(), &rule);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("internal error: configuration failure: "));
        assert_eq!(config::run(LoadOptions::default()).exit_code, 2);
    });
}

fn write_json(dir: &TempDir, name: &str, value: Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(&value).expect("serialize fixture"))
        .expect("write fixture");
    path
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "BENEFITS_ENGINE_STRICT_VARIABLES",
        "BENEFITS_ENGINE_MAX_DEPTH",
        "BENEFITS_ENGINE_COMPLEXITY_WARNING_THRESHOLD",
        "BENEFITS_QUESTIONNAIRE_REQUIRED_WEIGHT_PCT",
        "BENEFITS_QUESTIONNAIRE_SECONDS_PER_QUESTION",
        "BENEFITS_QUESTIONNAIRE_MAX_CHECKPOINTS",
        "BENEFITS_LOGGING_LEVEL",
        "BENEFITS_LOGGING_FORMAT",
        "BENEFITS_LOG_LEVEL",
        "BENEFITS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
