//! Benefit-specific operators layered on top of the base registry.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::Value;

use crate::rules::operators::{arg, invalid, OperatorRegistry};
use crate::rules::value::{compare, loose_equals};

/// Registers `between`, `age_from_dob` and `matches_any`, computing ages against today.
pub fn register_benefit_operators(registry: &mut OperatorRegistry) {
    register_common(registry);
    registry.insert("age_from_dob", |args: &[Value]| age_from_dob(args, Utc::now().date_naive()));
}

/// Same as [`register_benefit_operators`] with ages pinned to `as_of`.
pub fn register_benefit_operators_as_of(registry: &mut OperatorRegistry, as_of: NaiveDate) {
    register_common(registry);
    registry.insert("age_from_dob", move |args: &[Value]| age_from_dob(args, as_of));
}

fn register_common(registry: &mut OperatorRegistry) {
    registry.insert("between", |args: &[Value]| {
        if args.len() != 3 {
            return Err(invalid("between", format!("expected 3 operands, got {}", args.len())));
        }
        let value = arg(args, 0);
        if value.is_null() {
            return Ok(Value::Bool(false));
        }
        let above = compare(value, arg(args, 1)).is_some_and(|ordering| ordering.is_ge());
        let below = compare(value, arg(args, 2)).is_some_and(|ordering| ordering.is_le());
        Ok(Value::Bool(above && below))
    });

    registry.insert("matches_any", |args: &[Value]| {
        let needle = arg(args, 0);
        let found = match arg(args, 1) {
            Value::Array(items) => items.iter().any(|item| loose_equals(needle, item)),
            Value::Null => false,
            single => loose_equals(needle, single),
        };
        Ok(Value::Bool(found))
    });
}

fn age_from_dob(args: &[Value], as_of: NaiveDate) -> Result<Value, crate::rules::EvaluationError> {
    match arg(args, 0) {
        Value::Null => Ok(Value::Null),
        Value::String(raw) => {
            let dob = parse_date(raw)
                .ok_or_else(|| invalid("age_from_dob", format!("`{raw}` is not an ISO date")))?;
            Ok(Value::from(age_on(dob, as_of)))
        }
        other => Err(invalid("age_from_dob", format!("expected an ISO date string, got {other}"))),
    }
}

/// Whole years elapsed between `dob` and `as_of`. Future birth dates yield 0.
pub fn age_on(dob: NaiveDate, as_of: NaiveDate) -> i64 {
    let mut years = i64::from(as_of.year() - dob.year());
    if (as_of.month(), as_of.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0)
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(trimmed).ok().map(|stamp| stamp.date_naive()))
}
