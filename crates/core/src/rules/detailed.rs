use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::interpreter::{EvaluationObserver, Interpreter, OperationEvent};
use crate::rules::tree::RuleTree;
use crate::rules::value::{is_truthy, to_text};

/// Operators whose applications are reported as individual criteria.
pub const COMPARISON_OPERATORS: [&str; 11] =
    ["==", "===", "!=", "!==", "<", "<=", ">", ">=", "between", "matches_any", "in"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion: String,
    pub met: bool,
    pub value: Value,
    pub threshold: Value,
    pub comparison: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailedEvaluation {
    pub result: Value,
    pub success: bool,
    pub execution_time_ms: f64,
    pub error: Option<String>,
    pub criteria: Vec<CriterionResult>,
}

impl DetailedEvaluation {
    /// True only for a successful evaluation that produced exactly `true`.
    pub fn passed(&self) -> bool {
        self.success && self.result == Value::Bool(true)
    }
}

/// Runs the interpreter while recording one [`CriterionResult`] per comparison.
#[derive(Clone, Copy, Debug)]
pub struct DetailedEvaluator<'a> {
    interpreter: &'a Interpreter,
}

impl<'a> DetailedEvaluator<'a> {
    pub fn new(interpreter: &'a Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn evaluate_with_details(&self, rule: &RuleTree, data: &Value) -> DetailedEvaluation {
        let started = Instant::now();
        let mut recorder = CriteriaRecorder::default();
        let outcome = self.interpreter.evaluate_observed(rule, data, &mut recorder);
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(result) => DetailedEvaluation {
                result,
                success: true,
                execution_time_ms,
                error: None,
                criteria: recorder.criteria,
            },
            Err(error) => DetailedEvaluation {
                result: Value::Null,
                success: false,
                execution_time_ms,
                error: Some(error.to_string()),
                criteria: recorder.criteria,
            },
        }
    }

    /// Parses `rule` first; a parse failure is reported like any other evaluation error.
    pub fn evaluate_json_with_details(&self, rule: &Value, data: &Value) -> DetailedEvaluation {
        match RuleTree::parse(rule) {
            Ok(tree) => self.evaluate_with_details(&tree, data),
            Err(error) => DetailedEvaluation {
                result: Value::Null,
                success: false,
                execution_time_ms: 0.0,
                error: Some(error.to_string()),
                criteria: Vec::new(),
            },
        }
    }
}

#[derive(Default)]
struct CriteriaRecorder {
    criteria: Vec<CriterionResult>,
}

impl EvaluationObserver for CriteriaRecorder {
    fn on_operation(&mut self, event: &OperationEvent<'_>) {
        if COMPARISON_OPERATORS.iter().any(|name| *name == event.operator) {
            self.criteria.push(criterion_from(event));
        }
    }
}

fn criterion_from(event: &OperationEvent<'_>) -> CriterionResult {
    let operator = event.operator;
    let values = event.values;
    let ranged = matches!(operator, "<" | "<=") && values.len() == 3;

    let subject = if ranged { 1 } else { 0 };
    let criterion = event
        .operands
        .get(subject)
        .map(|operand| operand.static_var_path().unwrap_or_else(|| operand.to_string()))
        .unwrap_or_else(|| operator.to_string());
    let value = values.get(subject).cloned().unwrap_or(Value::Null);

    let threshold = if ranged {
        Value::Array(vec![values[0].clone(), values[2].clone()])
    } else {
        match values.get(1..) {
            Some([single]) => single.clone(),
            Some(rest) if !rest.is_empty() => Value::Array(rest.to_vec()),
            _ => Value::Null,
        }
    };

    let met = is_truthy(event.result);
    let message = format!(
        "{criterion} is {}, which {} the requirement {}",
        render(&value),
        if met { "meets" } else { "does not meet" },
        describe_requirement(operator, &threshold),
    );

    CriterionResult { criterion, met, value, threshold, comparison: operator.to_string(), message }
}

fn describe_requirement(operator: &str, threshold: &Value) -> String {
    match (operator, threshold) {
        ("between" | "<" | "<=", Value::Array(bounds)) if bounds.len() == 2 => {
            let exclusive = if operator == "<" { " (exclusive)" } else { "" };
            format!("between {} and {}{exclusive}", render(&bounds[0]), render(&bounds[1]))
        }
        _ => format!("{operator} {}", render(threshold)),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "not provided".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        scalar => to_text(scalar),
    }
}
