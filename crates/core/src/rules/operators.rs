use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::rules::interpreter::EvaluationError;
use crate::rules::tree::VAR_OPERATOR;
use crate::rules::value::{
    compare, is_truthy, loose_equals, number_value, strict_equals, to_number, to_text,
};

/// An eagerly evaluated operator: receives its operands already resolved.
pub type OperatorFn = Arc<dyn Fn(&[Value]) -> Result<Value, EvaluationError> + Send + Sync>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("operator name `{0}` is reserved by the interpreter")]
    ReservedName(String),
}

/// Operators that control evaluation of their own operands (short-circuiting, iteration,
/// data-context access). They are interpreted directly and can never be overridden.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    And,
    Or,
    If,
    Ternary,
    Map,
    Filter,
    Reduce,
    All,
    Any,
    NoneOf,
    Missing,
    MissingSome,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 12] = [
        Self::And,
        Self::Or,
        Self::If,
        Self::Ternary,
        Self::Map,
        Self::Filter,
        Self::Reduce,
        Self::All,
        Self::Any,
        Self::NoneOf,
        Self::Missing,
        Self::MissingSome,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "if" => Some(Self::If),
            "?:" => Some(Self::Ternary),
            "map" => Some(Self::Map),
            "filter" => Some(Self::Filter),
            "reduce" => Some(Self::Reduce),
            "all" => Some(Self::All),
            "some" => Some(Self::Any),
            "none" => Some(Self::NoneOf),
            "missing" => Some(Self::Missing),
            "missing_some" => Some(Self::MissingSome),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::If => "if",
            Self::Ternary => "?:",
            Self::Map => "map",
            Self::Filter => "filter",
            Self::Reduce => "reduce",
            Self::All => "all",
            Self::Any => "some",
            Self::NoneOf => "none",
            Self::Missing => "missing",
            Self::MissingSome => "missing_some",
        }
    }
}

/// The operator table owned by an [`Interpreter`](crate::rules::Interpreter).
///
/// Registration replaces any previous function under the same name, so registering the same
/// operator twice is harmless. Special forms and `var` cannot be registered.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    operators: HashMap<String, OperatorFn>,
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry").field("operators", &self.names()).finish()
    }
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_operators() -> Self {
        let mut registry = Self::new();
        register_base_operators(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, operator: F) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name == VAR_OPERATOR || SpecialForm::from_name(&name).is_some() {
            return Err(RegistryError::ReservedName(name));
        }
        self.insert(name, operator);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.operators.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&OperatorFn> {
        self.operators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// True for registered operators, special forms and `var`.
    pub fn is_known(&self, name: &str) -> bool {
        name == VAR_OPERATOR || SpecialForm::from_name(name).is_some() || self.contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.operators.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub(crate) fn insert<F>(&mut self, name: impl Into<String>, operator: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvaluationError> + Send + Sync + 'static,
    {
        self.operators.insert(name.into(), Arc::new(operator));
    }
}

fn register_base_operators(registry: &mut OperatorRegistry) {
    registry.insert("==", |args: &[Value]| Ok(Value::Bool(loose_equals(arg(args, 0), arg(args, 1)))));
    registry.insert("!=", |args: &[Value]| Ok(Value::Bool(!loose_equals(arg(args, 0), arg(args, 1)))));
    registry.insert("===", |args: &[Value]| {
        Ok(Value::Bool(strict_equals(arg(args, 0), arg(args, 1))))
    });
    registry.insert("!==", |args: &[Value]| {
        Ok(Value::Bool(!strict_equals(arg(args, 0), arg(args, 1))))
    });

    registry.insert(">", |args: &[Value]| Ok(Value::Bool(ordered(args, 0, 1, is_greater))));
    registry.insert(">=", |args: &[Value]| Ok(Value::Bool(ordered(args, 0, 1, is_greater_or_equal))));
    registry.insert("<", |args: &[Value]| Ok(Value::Bool(chained(args, is_less))));
    registry.insert("<=", |args: &[Value]| Ok(Value::Bool(chained(args, is_less_or_equal))));

    registry.insert("!", |args: &[Value]| Ok(Value::Bool(!is_truthy(arg(args, 0)))));
    registry.insert("!!", |args: &[Value]| Ok(Value::Bool(is_truthy(arg(args, 0)))));

    registry.insert("+", |args: &[Value]| {
        finite("+", numbers("+", args)?.iter().sum())
    });
    registry.insert("*", |args: &[Value]| {
        finite("*", numbers("*", args)?.iter().product())
    });
    registry.insert("-", |args: &[Value]| {
        let values = numbers("-", args)?;
        match values.as_slice() {
            [] => Err(invalid("-", "expected at least one operand")),
            [only] => finite("-", -only),
            [left, right, ..] => finite("-", left - right),
        }
    });
    registry.insert("/", |args: &[Value]| {
        let (left, right) = binary_numbers("/", args)?;
        if right == 0.0 {
            return Err(EvaluationError::DivisionByZero { operator: "/".to_string() });
        }
        finite("/", left / right)
    });
    registry.insert("%", |args: &[Value]| {
        let (left, right) = binary_numbers("%", args)?;
        if right == 0.0 {
            return Err(EvaluationError::DivisionByZero { operator: "%".to_string() });
        }
        finite("%", left % right)
    });
    registry.insert("min", |args: &[Value]| {
        let values = numbers("min", args)?;
        Ok(values.into_iter().reduce(f64::min).map(number_value).unwrap_or(Value::Null))
    });
    registry.insert("max", |args: &[Value]| {
        let values = numbers("max", args)?;
        Ok(values.into_iter().reduce(f64::max).map(number_value).unwrap_or(Value::Null))
    });

    registry.insert("cat", |args: &[Value]| {
        Ok(Value::String(args.iter().map(to_text).collect::<String>()))
    });
    registry.insert("substr", substr);
    registry.insert("in", |args: &[Value]| {
        let needle = arg(args, 0);
        let found = match arg(args, 1) {
            Value::Array(items) => items.iter().any(|item| strict_equals(item, needle)),
            Value::String(haystack) => haystack.contains(&to_text(needle)),
            _ => false,
        };
        Ok(Value::Bool(found))
    });
    registry.insert("merge", |args: &[Value]| {
        let mut merged = Vec::new();
        for value in args {
            match value {
                Value::Array(items) => merged.extend(items.iter().cloned()),
                other => merged.push(other.clone()),
            }
        }
        Ok(Value::Array(merged))
    });
}

static NULL: Value = Value::Null;

pub(crate) fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

pub(crate) fn invalid(operator: &str, message: impl Into<String>) -> EvaluationError {
    EvaluationError::InvalidArguments { operator: operator.to_string(), message: message.into() }
}

fn is_greater(ordering: Ordering) -> bool {
    ordering == Ordering::Greater
}

fn is_greater_or_equal(ordering: Ordering) -> bool {
    ordering != Ordering::Less
}

fn is_less(ordering: Ordering) -> bool {
    ordering == Ordering::Less
}

fn is_less_or_equal(ordering: Ordering) -> bool {
    ordering != Ordering::Greater
}

fn ordered(args: &[Value], left: usize, right: usize, accept: fn(Ordering) -> bool) -> bool {
    compare(arg(args, left), arg(args, right)).map(accept).unwrap_or(false)
}

/// `<` and `<=` accept a third operand: `{"<": [a, b, c]}` means `a < b < c`.
fn chained(args: &[Value], accept: fn(Ordering) -> bool) -> bool {
    if args.len() >= 3 {
        return ordered(args, 0, 1, accept) && ordered(args, 1, 2, accept);
    }
    ordered(args, 0, 1, accept)
}

fn numbers(operator: &str, args: &[Value]) -> Result<Vec<f64>, EvaluationError> {
    args.iter()
        .map(|value| {
            to_number(value).ok_or_else(|| invalid(operator, format!("`{value}` is not numeric")))
        })
        .collect()
}

/// Arithmetic on huge or non-numeric text such as `"inf"` can leave the finite range.
fn finite(operator: &str, result: f64) -> Result<Value, EvaluationError> {
    if result.is_finite() {
        Ok(number_value(result))
    } else {
        Err(invalid(operator, "result is not a finite number"))
    }
}

fn binary_numbers(operator: &str, args: &[Value]) -> Result<(f64, f64), EvaluationError> {
    if args.len() < 2 {
        return Err(invalid(operator, "expected two operands"));
    }
    let values = numbers(operator, &args[..2])?;
    Ok((values[0], values[1]))
}

fn substr(args: &[Value]) -> Result<Value, EvaluationError> {
    let source = to_text(arg(args, 0)).chars().collect::<Vec<_>>();
    let length = source.len();
    let start = to_number(arg(args, 1)).ok_or_else(|| invalid("substr", "start is not numeric"))?;
    let start = if start < 0.0 { length - clamped(start, length) } else { clamped(start, length) };

    let end = match args.get(2) {
        None | Some(Value::Null) => length,
        Some(raw) => {
            let count = to_number(raw).ok_or_else(|| invalid("substr", "length is not numeric"))?;
            if count < 0.0 {
                (length - clamped(count, length)).max(start)
            } else {
                start + clamped(count, length - start)
            }
        }
    };

    Ok(Value::String(source[start..end].iter().collect()))
}

/// Magnitude of `offset`, truncated toward zero and capped at `limit`. NaN counts as zero.
fn clamped(offset: f64, limit: usize) -> usize {
    if offset.is_nan() {
        return 0;
    }
    offset.abs().min(limit as f64) as usize
}
