use std::time::{Duration, Instant};

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::rules::domain::register_benefit_operators;
use crate::rules::operators::{invalid, OperatorRegistry, SpecialForm};
use crate::rules::tree::{Operation, RuleParseError, RuleTree, VarRef};
use crate::rules::value::{is_blank, is_truthy, lookup_path, to_number, to_text};

pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("invalid arguments for `{operator}`: {message}")]
    InvalidArguments { operator: String, message: String },
    #[error("division by zero in `{operator}`")]
    DivisionByZero { operator: String },
    #[error("variable `{0}` is not present in the data context")]
    MissingVariable(String),
    #[error("rule nesting exceeds the maximum depth of {limit}")]
    DepthExceeded { limit: usize },
    #[error(transparent)]
    Parse(#[from] RuleParseError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Raise [`EvaluationError::MissingVariable`] instead of resolving absent paths to `null`.
    pub strict_variables: bool,
    pub max_depth: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self { strict_variables: false, max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// One completed operator application, reported to an [`EvaluationObserver`].
#[derive(Debug)]
pub struct OperationEvent<'a> {
    pub operator: &'a str,
    pub operands: &'a [RuleTree],
    pub values: &'a [Value],
    pub result: &'a Value,
    pub depth: usize,
    pub elapsed: Duration,
}

/// Hooks into a single evaluation. Used by the detailed evaluator and the debug tracer so
/// neither has to walk the tree a second time.
pub trait EvaluationObserver {
    fn on_variable(&mut self, _path: &str, _value: &Value, _depth: usize) {}

    fn on_operation(&mut self, _event: &OperationEvent<'_>) {}

    /// Called once, at the node where the error originated.
    fn on_error(&mut self, _operator: &str, _error: &EvaluationError, _depth: usize) {}
}

struct Unobserved;

impl EvaluationObserver for Unobserved {}

/// Evaluates rule trees against a data context.
///
/// Evaluation is pure: the context is only borrowed and the interpreter keeps no state
/// between calls, so one instance can be shared by every session.
#[derive(Clone, Debug)]
pub struct Interpreter {
    registry: OperatorRegistry,
    options: InterpreterOptions,
}

impl Default for Interpreter {
    fn default() -> Self {
        let mut registry = OperatorRegistry::with_base_operators();
        register_benefit_operators(&mut registry);
        Self::new(registry, InterpreterOptions::default())
    }
}

impl Interpreter {
    pub fn new(registry: OperatorRegistry, options: InterpreterOptions) -> Self {
        Self { registry, options }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut registry = OperatorRegistry::with_base_operators();
        register_benefit_operators(&mut registry);
        Self::new(
            registry,
            InterpreterOptions {
                strict_variables: config.strict_variables,
                max_depth: config.max_depth,
            },
        )
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OperatorRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> InterpreterOptions {
        self.options
    }

    pub fn evaluate(&self, rule: &RuleTree, data: &Value) -> Result<Value, EvaluationError> {
        self.evaluate_observed(rule, data, &mut Unobserved)
    }

    pub fn evaluate_json(&self, rule: &Value, data: &Value) -> Result<Value, EvaluationError> {
        let tree = RuleTree::parse(rule)?;
        self.evaluate(&tree, data)
    }

    pub fn evaluate_observed(
        &self,
        rule: &RuleTree,
        data: &Value,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<Value, EvaluationError> {
        self.eval(rule, data, 0, observer)
    }

    /// Evaluates a predicate, degrading any evaluation error to `false`.
    ///
    /// Used for show-if, branch and skip conditions where one malformed rule must not block
    /// the rest of the questionnaire.
    pub fn evaluate_condition(&self, rule: &RuleTree, data: &Value) -> bool {
        match self.evaluate(rule, data) {
            Ok(value) => is_truthy(&value),
            Err(error) => {
                tracing::warn!(
                    event_name = "rules.condition_degraded",
                    error = %error,
                    rule = %rule,
                    "condition evaluation failed; treating it as false"
                );
                false
            }
        }
    }

    fn eval(
        &self,
        node: &RuleTree,
        data: &Value,
        depth: usize,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<Value, EvaluationError> {
        match node {
            RuleTree::Literal(value) => Ok(value.clone()),
            RuleTree::List(items) => items
                .iter()
                .map(|item| self.eval(item, data, depth, observer))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            RuleTree::Var(var) => {
                self.guard_depth("var", depth, observer)?;
                self.resolve_var(var, data, depth, observer)
            }
            RuleTree::Operation(operation) => {
                self.guard_depth(&operation.operator, depth, observer)?;
                self.apply(operation, data, depth, observer)
            }
        }
    }

    fn guard_depth(
        &self,
        operator: &str,
        depth: usize,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<(), EvaluationError> {
        if depth >= self.options.max_depth {
            let error = EvaluationError::DepthExceeded { limit: self.options.max_depth };
            observer.on_error(operator, &error, depth);
            return Err(error);
        }
        Ok(())
    }

    fn resolve_var(
        &self,
        var: &VarRef,
        data: &Value,
        depth: usize,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<Value, EvaluationError> {
        let path = match self.eval(&var.path, data, depth + 1, observer)? {
            Value::String(path) => path,
            Value::Number(index) => index.to_string(),
            Value::Null => String::new(),
            other => {
                let error = invalid("var", format!("path must resolve to a string, got {other}"));
                observer.on_error("var", &error, depth);
                return Err(error);
            }
        };

        let value = match lookup_path(data, &path) {
            Some(found) if !found.is_null() => found.clone(),
            found => match &var.default {
                Some(default) => self.eval(default, data, depth + 1, observer)?,
                None if found.is_none() && self.options.strict_variables => {
                    let error = EvaluationError::MissingVariable(path);
                    observer.on_error("var", &error, depth);
                    return Err(error);
                }
                None => Value::Null,
            },
        };

        observer.on_variable(&path, &value, depth);
        Ok(value)
    }

    fn apply(
        &self,
        operation: &Operation,
        data: &Value,
        depth: usize,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<Value, EvaluationError> {
        let started = Instant::now();
        let name = operation.operator.as_str();

        let (values, result) = match SpecialForm::from_name(name) {
            Some(form) => self.apply_special(form, operation, data, depth, observer)?,
            None => {
                let Some(function) = self.registry.get(name) else {
                    let error = EvaluationError::UnknownOperator(name.to_string());
                    observer.on_error(name, &error, depth);
                    return Err(error);
                };
                let values = operation
                    .operands
                    .iter()
                    .map(|operand| self.eval(operand, data, depth + 1, observer))
                    .collect::<Result<Vec<_>, _>>()?;
                match function(&values) {
                    Ok(result) => (values, result),
                    Err(error) => {
                        observer.on_error(name, &error, depth);
                        return Err(error);
                    }
                }
            }
        };

        observer.on_operation(&OperationEvent {
            operator: name,
            operands: &operation.operands,
            values: &values,
            result: &result,
            depth,
            elapsed: started.elapsed(),
        });
        Ok(result)
    }

    fn apply_special(
        &self,
        form: SpecialForm,
        operation: &Operation,
        data: &Value,
        depth: usize,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<(Vec<Value>, Value), EvaluationError> {
        let operands = operation.operands.as_slice();
        let child = depth + 1;
        let mut values = Vec::with_capacity(operands.len());

        let result = match form {
            SpecialForm::And | SpecialForm::Or => {
                let stop_when = form == SpecialForm::Or;
                let mut last = Value::Null;
                for operand in operands {
                    last = self.eval(operand, data, child, observer)?;
                    values.push(last.clone());
                    if is_truthy(&last) == stop_when {
                        break;
                    }
                }
                last
            }
            SpecialForm::If | SpecialForm::Ternary => {
                let mut index = 0;
                let mut chosen = None;
                while index + 1 < operands.len() {
                    let condition = self.eval(&operands[index], data, child, observer)?;
                    values.push(condition.clone());
                    if is_truthy(&condition) {
                        chosen = Some(&operands[index + 1]);
                        break;
                    }
                    index += 2;
                }
                let chosen = chosen.or_else(|| (operands.len() % 2 == 1).then(|| &operands[operands.len() - 1]));
                match chosen {
                    Some(branch) => {
                        let value = self.eval(branch, data, child, observer)?;
                        values.push(value.clone());
                        value
                    }
                    None => Value::Null,
                }
            }
            SpecialForm::Map | SpecialForm::Filter | SpecialForm::All | SpecialForm::Any | SpecialForm::NoneOf => {
                let items = self.eval_items(form, operands.first(), data, child, observer)?;
                values.push(Value::Array(items.clone()));
                let logic = operands.get(1);
                self.apply_iteration(form, items, logic, child, observer)?
            }
            SpecialForm::Reduce => {
                let items = self.eval_items(form, operands.first(), data, child, observer)?;
                let initial = match operands.get(2) {
                    Some(initial) => self.eval(initial, data, child, observer)?,
                    None => Value::Null,
                };
                values.push(Value::Array(items.clone()));
                values.push(initial.clone());
                let mut accumulator = initial;
                for item in items {
                    let scope = json!({"current": item, "accumulator": accumulator});
                    accumulator = match operands.get(1) {
                        Some(logic) => self.eval(logic, &scope, child, observer)?,
                        None => Value::Null,
                    };
                }
                accumulator
            }
            SpecialForm::Missing => {
                for operand in operands {
                    values.push(self.eval(operand, data, child, observer)?);
                }
                Value::Array(missing_keys(&values, data))
            }
            SpecialForm::MissingSome => {
                for operand in operands {
                    values.push(self.eval(operand, data, child, observer)?);
                }
                let needed = values.first().and_then(to_number).unwrap_or(0.0).max(0.0) as usize;
                let keys = values.get(1).cloned().unwrap_or(Value::Array(Vec::new()));
                let requested = match &keys {
                    Value::Array(items) => items.len(),
                    _ => 1,
                };
                let missing = missing_keys(std::slice::from_ref(&keys), data);
                if requested.saturating_sub(missing.len()) >= needed {
                    Value::Array(Vec::new())
                } else {
                    Value::Array(missing)
                }
            }
        };

        Ok((values, result))
    }

    fn eval_items(
        &self,
        form: SpecialForm,
        source: Option<&RuleTree>,
        data: &Value,
        depth: usize,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<Vec<Value>, EvaluationError> {
        let Some(source) = source else {
            return Ok(Vec::new());
        };
        match self.eval(source, data, depth, observer)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => {
                let error = invalid(form.name(), format!("expected an array, got {other}"));
                observer.on_error(form.name(), &error, depth);
                Err(error)
            }
        }
    }

    fn apply_iteration(
        &self,
        form: SpecialForm,
        items: Vec<Value>,
        logic: Option<&RuleTree>,
        depth: usize,
        observer: &mut dyn EvaluationObserver,
    ) -> Result<Value, EvaluationError> {
        let mut evaluate_item = |item: &Value| -> Result<Value, EvaluationError> {
            match logic {
                Some(logic) => self.eval(logic, item, depth, observer),
                None => Ok(Value::Null),
            }
        };

        let result = match form {
            SpecialForm::Map => Value::Array(
                items.iter().map(&mut evaluate_item).collect::<Result<Vec<_>, _>>()?,
            ),
            SpecialForm::Filter => {
                let mut kept = Vec::new();
                for item in items {
                    if is_truthy(&evaluate_item(&item)?) {
                        kept.push(item);
                    }
                }
                Value::Array(kept)
            }
            SpecialForm::All => {
                if items.is_empty() {
                    return Ok(Value::Bool(false));
                }
                for item in &items {
                    if !is_truthy(&evaluate_item(item)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Value::Bool(true)
            }
            SpecialForm::Any | SpecialForm::NoneOf => {
                let mut found = false;
                for item in &items {
                    if is_truthy(&evaluate_item(item)?) {
                        found = true;
                        break;
                    }
                }
                Value::Bool(if form == SpecialForm::Any { found } else { !found })
            }
            _ => Value::Null,
        };
        Ok(result)
    }
}

fn missing_keys(values: &[Value], data: &Value) -> Vec<Value> {
    let keys: Vec<&Value> = match values.first() {
        Some(Value::Array(items)) => items.iter().collect(),
        _ => values.iter().collect(),
    };

    keys.into_iter()
        .filter(|key| is_blank(lookup_path(data, &to_text(key))))
        .cloned()
        .collect()
}
