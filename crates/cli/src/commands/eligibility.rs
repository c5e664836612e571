use std::path::Path;
use std::sync::Arc;

use benefits_core::config::LoadOptions;
use benefits_core::eligibility::{
    EligibilityOrchestrator, EligibilityResult, InMemoryEligibilityStore, ProfileId, ProgramId,
    StoreDocument,
};
use benefits_core::rules::domain::parse_date;
use benefits_core::rules::Interpreter;
use serde::Serialize;

use crate::commands::{
    application_failure, load_config, read_input, CommandResult, EXIT_DOMAIN_FAILURE,
    EXIT_INPUT_FAILURE,
};

const COMMAND: &str = "eligibility";

#[derive(Debug, Serialize)]
struct EligibilityPayload {
    profile_id: ProfileId,
    results: Vec<EligibilityResult>,
}

/// Evaluates one household against the listed programs, or every program in the store
/// document when none are listed.
pub fn run(
    options: LoadOptions,
    store_path: &Path,
    profile_id: &str,
    program_ids: &[String],
    as_of: Option<&str>,
) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let document: StoreDocument = match read_input(COMMAND, store_path) {
        Ok(document) => document,
        Err(result) => return result,
    };

    let programs = if program_ids.is_empty() {
        document.programs.iter().map(|program| program.id.clone()).collect::<Vec<_>>()
    } else {
        program_ids.iter().map(|id| ProgramId::from(id.as_str())).collect()
    };

    let store = match InMemoryEligibilityStore::from_document(document) {
        Ok(store) => store,
        Err(error) => {
            return application_failure(COMMAND, "store", error, EXIT_INPUT_FAILURE)
        }
    };

    let interpreter = Arc::new(Interpreter::from_config(&config.engine));
    let mut orchestrator = EligibilityOrchestrator::new(store, interpreter);
    if let Some(raw) = as_of {
        match parse_date(raw) {
            Some(date) => orchestrator = orchestrator.with_reference_date(date),
            None => {
                return CommandResult::failure(
                    COMMAND,
                    "input",
                    format!("`{raw}` is not a YYYY-MM-DD date"),
                    EXIT_INPUT_FAILURE,
                )
            }
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_DOMAIN_FAILURE,
            );
        }
    };

    let profile_id = ProfileId::from(profile_id);
    let results = runtime.block_on(orchestrator.evaluate_all_programs(&profile_id, &programs));

    let eligible = results.iter().filter(|result| result.eligible).count();
    let failed = results.iter().any(|result| result.error.is_some());
    let message = format!("eligible for {eligible} of {} programs", results.len());

    CommandResult::report(COMMAND, !failed, message, &EligibilityPayload { profile_id, results })
}
