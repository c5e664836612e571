use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::rules::interpreter::Interpreter;
use crate::rules::operators::OperatorRegistry;
use crate::rules::tree::{RuleTree, VAR_OPERATOR};

pub const DEFAULT_COMPLEXITY_THRESHOLD: u32 = 50;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub operators: Vec<String>,
    pub variables: Vec<String>,
    pub complexity: u32,
    pub max_depth: usize,
}

/// Static checks over a rule document. Never evaluates anything.
#[derive(Clone, Debug)]
pub struct RuleValidator<'a> {
    registry: &'a OperatorRegistry,
    complexity_threshold: u32,
    max_depth: usize,
}

impl<'a> RuleValidator<'a> {
    pub fn new(interpreter: &'a Interpreter) -> Self {
        Self {
            registry: interpreter.registry(),
            complexity_threshold: DEFAULT_COMPLEXITY_THRESHOLD,
            max_depth: interpreter.options().max_depth,
        }
    }

    pub fn from_config(interpreter: &'a Interpreter, config: &EngineConfig) -> Self {
        Self::new(interpreter).with_complexity_threshold(config.complexity_warning_threshold)
    }

    pub fn with_complexity_threshold(mut self, threshold: u32) -> Self {
        self.complexity_threshold = threshold;
        self
    }

    pub fn validate_tree(&self, rule: &RuleTree) -> ValidationReport {
        self.validate(&rule.to_value())
    }

    pub fn validate(&self, rule: &Value) -> ValidationReport {
        let mut walk = Walk::default();
        self.visit(rule, "$", 0, &mut walk);

        let complexity = walk.node_weight + 2 * walk.deepest as u32;
        let mut warnings = walk.warnings;
        if complexity > self.complexity_threshold {
            warnings.push(format!(
                "complexity {complexity} exceeds {}; consider splitting this rule into smaller \
                 rules that each check one criterion",
                self.complexity_threshold
            ));
        }

        ValidationReport {
            valid: walk.errors.is_empty(),
            errors: walk.errors,
            warnings,
            operators: walk.operators,
            variables: walk.variables,
            complexity,
            max_depth: walk.deepest,
        }
    }

    fn visit(&self, node: &Value, path: &str, depth: usize, walk: &mut Walk) {
        match node {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.visit(item, &format!("{path}[{index}]"), depth, walk);
                }
            }
            Value::Object(object) => self.visit_operator(object, path, depth, walk),
            _ => {}
        }
    }

    fn visit_operator(&self, object: &Map<String, Value>, path: &str, depth: usize, walk: &mut Walk) {
        let (operator, operand) = match object.len() {
            0 => {
                walk.errors.push(format!("operator object at {path} has no keys"));
                return;
            }
            1 => match object.iter().next() {
                Some(entry) => entry,
                None => return,
            },
            count => {
                let keys = object.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
                walk.errors.push(format!(
                    "operator object at {path} has {count} keys ({keys}); exactly one is required"
                ));
                return;
            }
        };

        if depth >= self.max_depth {
            if !walk.depth_reported {
                walk.errors.push(format!(
                    "rule nesting at {path} exceeds the maximum depth of {}",
                    self.max_depth
                ));
                walk.depth_reported = true;
            }
            return;
        }
        walk.deepest = walk.deepest.max(depth + 1);

        let child_path = format!("{path}.{operator}");
        if operator == VAR_OPERATOR {
            self.visit_var(operand, &child_path, depth, walk);
            return;
        }

        push_unique(&mut walk.operators, operator);
        if !self.registry.is_known(operator) {
            walk.errors.push(format!("unknown operator `{operator}` at {path}"));
        }

        let operand_count = match operand {
            Value::Array(items) => items.len(),
            _ => 1,
        };
        walk.node_weight += 1 + operand_count.saturating_sub(2) as u32;

        match operand {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.visit(item, &format!("{child_path}[{index}]"), depth + 1, walk);
                }
            }
            single => self.visit(single, &child_path, depth + 1, walk),
        }
    }

    fn visit_var(&self, operand: &Value, path: &str, depth: usize, walk: &mut Walk) {
        let (target, default) = match operand {
            Value::Array(items) if items.len() > 2 => {
                walk.errors.push(format!(
                    "malformed `var` operand at {path}: expected at most 2 items, found {}",
                    items.len()
                ));
                return;
            }
            Value::Array(items) => (items.first(), items.get(1)),
            other => (Some(other), None),
        };

        match target.unwrap_or(&Value::Null) {
            Value::String(name) => push_unique(&mut walk.variables, name),
            Value::Number(index) => push_unique(&mut walk.variables, &index.to_string()),
            Value::Null => {}
            computed @ Value::Object(_) => {
                walk.warnings.push(format!(
                    "variable path at {path} is computed at runtime and cannot be checked statically"
                ));
                self.visit(computed, path, depth + 1, walk);
            }
            Value::Bool(_) | Value::Array(_) => {
                walk.errors.push(format!(
                    "malformed `var` operand at {path}: path must be a string, number or expression"
                ));
            }
        }

        if let Some(default) = default {
            self.visit(default, &format!("{path}[1]"), depth + 1, walk);
        }
    }
}

#[derive(Default)]
struct Walk {
    errors: Vec<String>,
    warnings: Vec<String>,
    operators: Vec<String>,
    variables: Vec<String>,
    node_weight: u32,
    deepest: usize,
    depth_reported: bool,
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}
