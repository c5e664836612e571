//! Execution tracing for rule authors.
//!
//! Steps are recorded in completion order, so children always precede their parents. A failed
//! evaluation still returns every step completed before the failure.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::rules::interpreter::{EvaluationError, EvaluationObserver, Interpreter, OperationEvent};
use crate::rules::tree::RuleTree;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceStep {
    pub index: usize,
    pub description: String,
    pub operator: String,
    pub operands: Vec<Value>,
    pub result: Value,
    pub depth: usize,
    pub duration_micros: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DebugReport {
    pub result: Option<Value>,
    pub success: bool,
    pub trace: Vec<TraceStep>,
    pub total_time_ms: f64,
    pub variables_accessed: Vec<String>,
    pub operators_used: Vec<String>,
    pub max_depth: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct DebugTracer<'a> {
    interpreter: &'a Interpreter,
}

impl<'a> DebugTracer<'a> {
    pub fn new(interpreter: &'a Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn debug_rule(&self, rule: &RuleTree, data: &Value) -> DebugReport {
        let started = Instant::now();
        let mut recorder = TraceRecorder::default();
        let outcome = self.interpreter.evaluate_observed(rule, data, &mut recorder);
        let total_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let TraceRecorder { trace, variables, operators, max_depth, mut errors, warnings } = recorder;
        let (result, success) = match outcome {
            Ok(value) => (Some(value), true),
            Err(error) => {
                let message = error.to_string();
                if !errors.contains(&message) {
                    errors.push(message);
                }
                (None, false)
            }
        };

        DebugReport {
            result,
            success,
            trace,
            total_time_ms,
            variables_accessed: variables,
            operators_used: operators,
            max_depth,
            errors,
            warnings,
        }
    }

    pub fn debug_json(&self, rule: &Value, data: &Value) -> DebugReport {
        match RuleTree::parse(rule) {
            Ok(tree) => self.debug_rule(&tree, data),
            Err(error) => DebugReport {
                result: None,
                success: false,
                trace: Vec::new(),
                total_time_ms: 0.0,
                variables_accessed: Vec::new(),
                operators_used: Vec::new(),
                max_depth: 0,
                errors: vec![error.to_string()],
                warnings: Vec::new(),
            },
        }
    }
}

#[derive(Default)]
struct TraceRecorder {
    trace: Vec<TraceStep>,
    variables: Vec<String>,
    operators: Vec<String>,
    max_depth: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl TraceRecorder {
    fn record(&mut self, step: TraceStep) {
        self.max_depth = self.max_depth.max(step.depth);
        self.trace.push(step);
    }
}

impl EvaluationObserver for TraceRecorder {
    fn on_variable(&mut self, path: &str, value: &Value, depth: usize) {
        if !self.variables.iter().any(|seen| seen == path) {
            self.variables.push(path.to_string());
        }
        if value.is_null() {
            self.warnings.push(format!("variable `{path}` resolved to null"));
        }
        self.record(TraceStep {
            index: self.trace.len(),
            description: format!("read `{path}` = {value}"),
            operator: "var".to_string(),
            operands: vec![Value::String(path.to_string())],
            result: value.clone(),
            depth,
            duration_micros: 0,
        });
    }

    fn on_operation(&mut self, event: &OperationEvent<'_>) {
        if !self.operators.iter().any(|seen| seen == event.operator) {
            self.operators.push(event.operator.to_string());
        }
        let rendered = event.values.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
        self.record(TraceStep {
            index: self.trace.len(),
            description: format!("{}({rendered}) => {}", event.operator, event.result),
            operator: event.operator.to_string(),
            operands: event.values.to_vec(),
            result: event.result.clone(),
            depth: event.depth,
            duration_micros: u64::try_from(event.elapsed.as_micros()).unwrap_or(u64::MAX),
        });
    }

    fn on_error(&mut self, operator: &str, error: &EvaluationError, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
        self.errors.push(error.to_string());
        tracing::debug!(
            event_name = "rules.trace_error",
            operator,
            depth,
            error = %error,
            "rule evaluation failed while tracing"
        );
    }
}

/// Renders a report as indented text, two spaces per nesting level, ending in a summary line.
pub fn format_trace(report: &DebugReport) -> String {
    report.to_string()
}

impl fmt::Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.trace {
            writeln!(
                f,
                "{}[{}] {} ({}us)",
                "  ".repeat(step.depth),
                step.index,
                step.description,
                step.duration_micros
            )?;
        }
        for error in &self.errors {
            writeln!(f, "error: {error}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }

        match (&self.result, self.success) {
            (Some(result), true) => write!(f, "result {result}")?,
            _ => f.write_str("failed")?,
        }
        write!(
            f,
            " in {:.3}ms; {} steps, {} variables, {} operators, max depth {}",
            self.total_time_ms,
            self.trace.len(),
            self.variables_accessed.len(),
            self.operators_used.len(),
            self.max_depth
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{format_trace, DebugTracer};
    use crate::rules::Interpreter;

    #[test]
    fn traces_children_before_parents() {
        let interpreter = Interpreter::default();
        let report = DebugTracer::new(&interpreter).debug_json(
            &json!({"and": [{">": [{"var": "age"}, 18]}, {"<": [{"var": "age"}, 65]}]}),
            &json!({"age": 30}),
        );

        assert!(report.success);
        assert_eq!(report.result, Some(json!(true)));
        let operators = report.trace.iter().map(|step| step.operator.as_str()).collect::<Vec<_>>();
        assert_eq!(operators, vec!["var", ">", "var", "<", "and"]);
        assert_eq!(report.variables_accessed, vec!["age"]);
        assert_eq!(report.operators_used, vec![">", "<", "and"]);
        assert_eq!(report.max_depth, 2);
        assert!(report.trace.iter().enumerate().all(|(index, step)| step.index == index));
    }

    #[test]
    fn keeps_the_partial_trace_on_failure() {
        let interpreter = Interpreter::default();
        let report = DebugTracer::new(&interpreter).debug_json(
            &json!({"and": [{"==": [{"var": "state"}, "CA"]}, {"/": [1, 0]}]}),
            &json!({"state": "CA"}),
        );

        assert!(!report.success);
        assert_eq!(report.result, None);
        assert_eq!(report.trace.len(), 2);
        assert_eq!(report.errors, vec!["division by zero in `/`".to_string()]);
    }

    #[test]
    fn null_variables_raise_warnings() {
        let interpreter = Interpreter::default();
        let report = DebugTracer::new(&interpreter)
            .debug_json(&json!({"!": {"var": "hasIncome"}}), &json!({}));

        assert_eq!(report.result, Some(json!(true)));
        assert_eq!(report.warnings, vec!["variable `hasIncome` resolved to null".to_string()]);
    }

    #[test]
    fn formatted_trace_indents_by_depth() {
        let interpreter = Interpreter::default();
        let report = DebugTracer::new(&interpreter)
            .debug_json(&json!({">": [{"var": "age"}, 18]}), &json!({"age": 25}));
        let text = format_trace(&report);
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("  [0] read `age` = 25"));
        assert!(lines[1].starts_with("[1] >(25, 18) => true"));
        assert!(lines[2].starts_with("result true in "));
        assert_eq!(report.to_string(), text);
    }

    #[test]
    fn formatted_failures_list_errors_before_the_summary() {
        let interpreter = Interpreter::default();
        let report = DebugTracer::new(&interpreter).debug_json(&json!({"/": [1, 0]}), &json!({}));
        let text = format_trace(&report);
        let lines = text.lines().collect::<Vec<_>>();

        assert!(lines.contains(&"error: division by zero in `/`"));
        assert!(lines.last().is_some_and(|line| line.starts_with("failed in ")));
    }

    #[test]
    fn parse_failures_are_reported() {
        let interpreter = Interpreter::default();
        let report = DebugTracer::new(&interpreter).debug_json(&json!({}), &json!({}));
        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
    }
}
