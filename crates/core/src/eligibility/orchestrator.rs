use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::eligibility::context::{missing_fields, prepare_data_context};
use crate::eligibility::explanation::{explain, fallback};
use crate::eligibility::store::EligibilityStore;
use crate::eligibility::{
    BenefitProgram, EligibilityResult, EligibilityRule, HouseholdProfile, ProfileId, ProgramId,
};
use crate::errors::{ApplicationError, DomainError};
use crate::rules::{DetailedEvaluation, DetailedEvaluator, Interpreter};

pub const CONFIDENCE_HIGH: u8 = 95;
pub const CONFIDENCE_INCOMPLETE: u8 = 50;
pub const CONFIDENCE_NONE: u8 = 0;

/// Loads a program's rules, evaluates them against a household, and folds the outcomes into
/// one explained [`EligibilityResult`].
///
/// Every call returns a result. Store failures, unknown ids and programs without active rules
/// are converted into a fallback result rather than an error, so a batch keeps going when one
/// program's data is broken.
pub struct EligibilityOrchestrator<S> {
    store: S,
    interpreter: Arc<Interpreter>,
    audit: Option<Arc<dyn AuditSink>>,
    as_of: Option<NaiveDate>,
}

impl<S> EligibilityOrchestrator<S>
where
    S: EligibilityStore,
{
    pub fn new(store: S, interpreter: Arc<Interpreter>) -> Self {
        Self { store, interpreter, audit: None, as_of: None }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Pins the date used to derive ages from birth dates.
    pub fn with_reference_date(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn evaluate_eligibility(
        &self,
        profile_id: &ProfileId,
        program_id: &ProgramId,
    ) -> EligibilityResult {
        let started = Instant::now();
        match self.try_evaluate(profile_id, program_id).await {
            Ok(result) => {
                tracing::info!(
                    event_name = "eligibility.evaluated",
                    profile_id = %profile_id,
                    program_id = %program_id,
                    eligible = result.eligible,
                    confidence = result.confidence,
                    missing_fields = result.missing_fields.len(),
                    "eligibility evaluated"
                );
                self.emit(
                    AuditEvent::new(
                        Some(profile_id.0.clone()),
                        result.id.clone(),
                        "eligibility.evaluated",
                        AuditCategory::Evaluation,
                        "eligibility-orchestrator",
                        AuditOutcome::Success,
                    )
                    .with_metadata("program_id", program_id.0.clone())
                    .with_metadata("eligible", result.eligible.to_string())
                    .with_metadata("confidence", result.confidence.to_string()),
                );
                result
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "eligibility.fallback",
                    profile_id = %profile_id,
                    program_id = %program_id,
                    error = %error,
                    "eligibility evaluation failed; returning fallback result"
                );
                let result = fallback_result(profile_id, program_id, &error, started);
                self.emit(
                    AuditEvent::new(
                        Some(profile_id.0.clone()),
                        result.id.clone(),
                        "eligibility.failed",
                        AuditCategory::Evaluation,
                        "eligibility-orchestrator",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("program_id", program_id.0.clone())
                    .with_metadata("error", error.to_string()),
                );
                result
            }
        }
    }

    /// Evaluates each program independently, in the order given.
    pub async fn evaluate_all_programs(
        &self,
        profile_id: &ProfileId,
        program_ids: &[ProgramId],
    ) -> Vec<EligibilityResult> {
        let mut results = Vec::with_capacity(program_ids.len());
        for program_id in program_ids {
            results.push(self.evaluate_eligibility(profile_id, program_id).await);
        }
        results
    }

    async fn try_evaluate(
        &self,
        profile_id: &ProfileId,
        program_id: &ProgramId,
    ) -> Result<EligibilityResult, ApplicationError> {
        let profile = self
            .store
            .find_profile(profile_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound { entity: "profile", id: profile_id.0.clone() })?;
        let program = self
            .store
            .find_program(program_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound { entity: "program", id: program_id.0.clone() })?;
        let rules = self.store.find_active_rules_for_program(program_id).await?;

        self.evaluate_rules(&profile, &program, rules)
    }

    /// The synchronous half of an evaluation, once everything is loaded.
    pub fn evaluate_rules(
        &self,
        profile: &HouseholdProfile,
        program: &BenefitProgram,
        mut rules: Vec<EligibilityRule>,
    ) -> Result<EligibilityResult, ApplicationError> {
        let started = Instant::now();
        rules.retain(|rule| rule.active);
        if rules.is_empty() {
            return Err(ApplicationError::NotFound {
                entity: "active rules for program",
                id: program.id.0.clone(),
            });
        }
        // Stable: equal priorities keep store order.
        rules.sort_by(|left, right| right.priority.cmp(&left.priority));

        let as_of = self.as_of.unwrap_or_else(|| Utc::now().date_naive());
        let context = prepare_data_context(profile, as_of);
        let evaluator = DetailedEvaluator::new(&self.interpreter);

        let evaluations: Vec<(&EligibilityRule, DetailedEvaluation)> = rules
            .iter()
            .map(|rule| (rule, evaluator.evaluate_with_details(&rule.logic, &context)))
            .collect();

        let mut missing = Vec::new();
        for rule in &rules {
            for field in missing_fields(&context, &rule.required_fields) {
                if !missing.contains(&field) {
                    missing.push(field);
                }
            }
        }

        let eligible = evaluations.iter().all(|(_, evaluation)| evaluation.passed());
        let (representative, representative_evaluation) = evaluations
            .iter()
            .find(|(_, evaluation)| !evaluation.passed())
            .or_else(|| evaluations.first())
            .map(|(rule, evaluation)| (*rule, evaluation))
            .ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "no rule evaluations were produced for program `{}`",
                    program.id.0
                ))
            })?;

        let confidence = if !representative_evaluation.success {
            CONFIDENCE_NONE
        } else if !missing.is_empty() {
            CONFIDENCE_INCOMPLETE
        } else {
            CONFIDENCE_HIGH
        };

        let criteria = evaluations
            .iter()
            .flat_map(|(_, evaluation)| evaluation.criteria.iter().cloned())
            .collect::<Vec<_>>();

        let mut required_documents = Vec::new();
        if eligible {
            for document in rules.iter().flat_map(|rule| rule.required_documents.iter()) {
                if !required_documents.contains(document) {
                    required_documents.push(document.clone());
                }
            }
        }

        let explanation = explain(
            program,
            representative,
            eligible,
            &criteria,
            &missing,
            rules.iter().map(|rule| rule.id.0.clone()).collect(),
        );

        Ok(EligibilityResult {
            id: Uuid::new_v4().to_string(),
            profile_id: profile.id.clone(),
            program_id: program.id.clone(),
            eligible,
            confidence,
            criteria,
            missing_fields: missing,
            rule_id: Some(representative.id.clone()),
            rule_version: Some(representative.version),
            explanation,
            required_documents,
            needs_review: confidence != CONFIDENCE_HIGH,
            error: representative_evaluation.error.clone(),
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            evaluated_at: Utc::now(),
        })
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(sink) = &self.audit {
            sink.emit(event);
        }
    }
}

fn fallback_result(
    profile_id: &ProfileId,
    program_id: &ProgramId,
    error: &ApplicationError,
    started: Instant,
) -> EligibilityResult {
    EligibilityResult {
        id: Uuid::new_v4().to_string(),
        profile_id: profile_id.clone(),
        program_id: program_id.clone(),
        eligible: false,
        confidence: CONFIDENCE_NONE,
        criteria: Vec::new(),
        missing_fields: Vec::new(),
        rule_id: None,
        rule_version: None,
        explanation: fallback(error),
        required_documents: Vec::new(),
        needs_review: true,
        error: Some(error.to_string()),
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        evaluated_at: Utc::now(),
    }
}
