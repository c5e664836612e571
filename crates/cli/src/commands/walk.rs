use std::path::Path;
use std::sync::Arc;

use benefits_core::config::LoadOptions;
use benefits_core::flows::{
    Answers, FlowGraph, FlowProgress, QuestionnaireSession, SessionState, SkipLogicManager,
    SkipRule,
};
use benefits_core::rules::Interpreter;
use serde::Serialize;

use crate::commands::{
    application_failure, load_config, read_input, CommandResult, EXIT_DOMAIN_FAILURE,
    EXIT_INPUT_FAILURE,
};

const COMMAND: &str = "walk";

#[derive(Debug, Serialize)]
struct WalkPayload {
    state: SessionState,
    path: Vec<String>,
    questions_skipped: Vec<String>,
    unanswered: Vec<String>,
    stopped_by: Option<String>,
    progress: FlowProgress,
}

/// Drives a session from the start node to the end of the flow, answering each visited
/// question from `answers` when an answer is available.
pub fn run(
    options: LoadOptions,
    flow_path: &Path,
    answers_path: Option<&Path>,
    skip_rules_path: Option<&Path>,
) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let graph: FlowGraph = match read_input(COMMAND, flow_path) {
        Ok(graph) => graph,
        Err(result) => return result,
    };
    if let Err(error) = graph.validate() {
        return CommandResult::failure(COMMAND, "flow_graph", error.to_string(), EXIT_INPUT_FAILURE);
    }
    let answers: Answers = match answers_path {
        Some(path) => match read_input(COMMAND, path) {
            Ok(answers) => answers,
            Err(result) => return result,
        },
        None => Answers::new(),
    };
    let skip_rules: Vec<SkipRule> = match skip_rules_path {
        Some(path) => match read_input(COMMAND, path) {
            Ok(rules) => rules,
            Err(result) => return result,
        },
        None => Vec::new(),
    };

    let step_limit = graph.nodes.len();
    let interpreter = Arc::new(Interpreter::from_config(&config.engine));
    let mut session = QuestionnaireSession::from_config(
        graph,
        SkipLogicManager::new(skip_rules),
        interpreter,
        &config.questionnaire,
    );

    let mut path = Vec::new();
    let mut questions_skipped = Vec::new();
    let mut unanswered = Vec::new();
    let mut stopped_by = None;

    let mut step = match session.start() {
        Ok(result) => result,
        Err(error) => {
            return application_failure(COMMAND, "session", error, EXIT_DOMAIN_FAILURE)
        }
    };

    loop {
        if !step.success {
            if session.state() != SessionState::Completed {
                stopped_by = step.error.as_ref().map(ToString::to_string);
            }
            break;
        }
        questions_skipped.extend(step.questions_skipped.iter().cloned());

        let Some(node_id) = step.target_node_id.clone() else {
            break;
        };
        if path.len() >= step_limit || path.contains(&node_id) {
            stopped_by = Some(format!("node `{node_id}` was reached twice"));
            break;
        }

        let question_id = session
            .navigation()
            .graph()
            .node(&node_id)
            .map(|node| node.question_id.clone())
            .unwrap_or_default();
        match answers.get(&question_id) {
            Some(value) => {
                if let Err(error) = session.answer(question_id, value.clone()) {
                    stopped_by = Some(error.to_string());
                    break;
                }
            }
            None => unanswered.push(question_id),
        }
        path.push(node_id);

        step = match session.next() {
            Ok(result) => result,
            Err(error) => {
                stopped_by = Some(error.to_string());
                break;
            }
        };
    }

    let state = session.state();
    let completed = state == SessionState::Completed;
    let payload = WalkPayload {
        state,
        path,
        questions_skipped,
        unanswered,
        stopped_by,
        progress: session.progress(),
    };
    let message = format!(
        "visited {} questions, progress {}%",
        payload.path.len(),
        payload.progress.progress_percent
    );
    CommandResult::report(COMMAND, completed, message, &payload)
}
