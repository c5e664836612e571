pub mod audit;
pub mod config;
pub mod eligibility;
pub mod errors;
pub mod flows;
pub mod rules;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use eligibility::{
    BenefitProgram, EligibilityExplanation, EligibilityOrchestrator, EligibilityResult,
    EligibilityRule, EligibilityStore, HouseholdProfile, InMemoryEligibilityStore, ProfileId,
    ProgramId, RuleId, StoreDocument, StoreError,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    Answers, FlowGraph, FlowNode, FlowProgress, NavigationManager, NavigationResult,
    ProgressTracker, QuestionnaireSession, SessionState, SkipLogicManager,
};
pub use rules::{
    DetailedEvaluation, DetailedEvaluator, EvaluationError, Interpreter, OperatorRegistry,
    RuleTree, RuleValidator, ValidationReport,
};
