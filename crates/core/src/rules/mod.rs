pub mod debugger;
pub mod detailed;
pub mod domain;
pub mod interpreter;
pub mod operators;
pub mod testing;
pub mod tree;
pub mod validator;
pub mod value;

pub use debugger::{format_trace, DebugReport, DebugTracer, TraceStep};
pub use detailed::{CriterionResult, DetailedEvaluation, DetailedEvaluator};
pub use domain::{register_benefit_operators, register_benefit_operators_as_of};
pub use interpreter::{
    EvaluationError, EvaluationObserver, Interpreter, InterpreterOptions, OperationEvent,
};
pub use operators::{OperatorFn, OperatorRegistry, RegistryError, SpecialForm};
pub use testing::{run_rule_tests, RuleTestCase, RuleTestOutcome, RuleTestReport};
pub use tree::{Operation, OperandForm, RuleParseError, RuleTree, VarRef};
pub use validator::{RuleValidator, ValidationReport};
