use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const VAR_OPERATOR: &str = "var";

/// Nesting limit applied while parsing JSON into a [`RuleTree`].
pub const MAX_PARSE_DEPTH: usize = 512;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("operator object at {path} has no keys")]
    EmptyOperator { path: String },
    #[error("operator object at {path} has {count} keys ({keys}); exactly one is required")]
    MultipleOperators { path: String, count: usize, keys: String },
    #[error("malformed `var` operand at {path}: {message}")]
    InvalidVar { path: String, message: String },
    #[error("rule nesting at {path} exceeds {limit} levels")]
    TooDeep { path: String, limit: usize },
}

/// Whether an operator's operands were written as an array or as a single bare value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OperandForm {
    #[default]
    Array,
    Bare,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarRef {
    pub path: Box<RuleTree>,
    pub default: Option<Box<RuleTree>>,
    pub form: OperandForm,
}

impl VarRef {
    /// The dot path when it is written as a literal, `None` when it is computed.
    pub fn static_path(&self) -> Option<String> {
        match self.path.as_ref() {
            RuleTree::Literal(Value::String(path)) => Some(path.clone()),
            RuleTree::Literal(Value::Number(index)) => Some(index.to_string()),
            RuleTree::Literal(Value::Null) => Some(String::new()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub operator: String,
    pub operands: Vec<RuleTree>,
    pub form: OperandForm,
}

/// A parsed rule expression.
///
/// Rules arrive as operator-keyed JSON (`{"<=": [{"var": "income"}, 4000]}`) and are parsed
/// once at that boundary. Everything downstream matches on this closed set of variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum RuleTree {
    Literal(Value),
    Var(VarRef),
    List(Vec<RuleTree>),
    Operation(Operation),
}

impl RuleTree {
    pub fn parse(value: &Value) -> Result<Self, RuleParseError> {
        parse_node(value, "$", 0)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn var(path: impl Into<String>) -> Self {
        Self::Var(VarRef {
            path: Box::new(Self::Literal(Value::String(path.into()))),
            default: None,
            form: OperandForm::Bare,
        })
    }

    pub fn op(operator: impl Into<String>, operands: Vec<RuleTree>) -> Self {
        Self::Operation(Operation {
            operator: operator.into(),
            operands,
            form: OperandForm::Array,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Var(var) => {
                let operand = match (&var.default, var.form) {
                    (Some(default), _) => Value::Array(vec![var.path.to_value(), default.to_value()]),
                    (None, OperandForm::Array) => Value::Array(vec![var.path.to_value()]),
                    (None, OperandForm::Bare) => var.path.to_value(),
                };
                single_key(VAR_OPERATOR, operand)
            }
            Self::Operation(operation) => {
                let operand = match (operation.form, operation.operands.as_slice()) {
                    (OperandForm::Bare, [only]) => only.to_value(),
                    _ => Value::Array(operation.operands.iter().map(Self::to_value).collect()),
                };
                single_key(&operation.operator, operand)
            }
        }
    }

    /// The literal variable path when this node is a plain `var` reference.
    pub fn static_var_path(&self) -> Option<String> {
        match self {
            Self::Var(var) => var.static_path(),
            _ => None,
        }
    }
}

impl TryFrom<Value> for RuleTree {
    type Error = RuleParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RuleTree> for Value {
    fn from(tree: RuleTree) -> Self {
        tree.to_value()
    }
}

impl fmt::Display for RuleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

fn single_key(key: &str, value: Value) -> Value {
    let mut object = Map::with_capacity(1);
    object.insert(key.to_string(), value);
    Value::Object(object)
}

fn parse_node(value: &Value, path: &str, depth: usize) -> Result<RuleTree, RuleParseError> {
    if depth > MAX_PARSE_DEPTH {
        return Err(RuleParseError::TooDeep { path: path.to_string(), limit: MAX_PARSE_DEPTH });
    }

    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_node(item, &format!("{path}[{index}]"), depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(RuleTree::List),
        Value::Object(object) => parse_object(object, path, depth),
        literal => Ok(RuleTree::Literal(literal.clone())),
    }
}

fn parse_object(
    object: &Map<String, Value>,
    path: &str,
    depth: usize,
) -> Result<RuleTree, RuleParseError> {
    let mut entries = object.iter();
    let (operator, operand) = match (entries.next(), object.len()) {
        (None, _) => return Err(RuleParseError::EmptyOperator { path: path.to_string() }),
        (Some(entry), 1) => entry,
        (Some(_), count) => {
            let keys = object.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
            return Err(RuleParseError::MultipleOperators { path: path.to_string(), count, keys });
        }
    };

    let child_path = format!("{path}.{operator}");
    if operator == VAR_OPERATOR {
        return parse_var(operand, &child_path, depth).map(RuleTree::Var);
    }

    let (operands, form) = match operand {
        Value::Array(items) => (
            items
                .iter()
                .enumerate()
                .map(|(index, item)| parse_node(item, &format!("{child_path}[{index}]"), depth + 1))
                .collect::<Result<Vec<_>, _>>()?,
            OperandForm::Array,
        ),
        single => (vec![parse_node(single, &child_path, depth + 1)?], OperandForm::Bare),
    };

    Ok(RuleTree::Operation(Operation { operator: operator.clone(), operands, form }))
}

fn parse_var(operand: &Value, path: &str, depth: usize) -> Result<VarRef, RuleParseError> {
    let (path_value, default, form) = match operand {
        Value::Array(items) if items.len() > 2 => {
            return Err(RuleParseError::InvalidVar {
                path: path.to_string(),
                message: format!("expected at most 2 items (path, default), found {}", items.len()),
            });
        }
        Value::Array(items) => {
            let path_value = items.first().cloned().unwrap_or(Value::String(String::new()));
            (path_value, items.get(1), OperandForm::Array)
        }
        other => (other.clone(), None, OperandForm::Bare),
    };

    let parsed_path = match &path_value {
        Value::String(_) | Value::Number(_) | Value::Null => RuleTree::Literal(path_value.clone()),
        Value::Object(_) => parse_node(&path_value, path, depth + 1)?,
        Value::Bool(_) | Value::Array(_) => {
            return Err(RuleParseError::InvalidVar {
                path: path.to_string(),
                message: format!("path must be a string, number or expression, found {path_value}"),
            });
        }
    };

    let default = default
        .map(|value| parse_node(value, &format!("{path}[1]"), depth + 1).map(Box::new))
        .transpose()?;

    Ok(VarRef { path: Box::new(parsed_path), default, form })
}
