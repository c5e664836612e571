//! Turns a stored household profile into the data context rules are evaluated against.

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};

use crate::eligibility::HouseholdProfile;
use crate::rules::domain::{age_on, parse_date};
use crate::rules::value::{is_blank, lookup_path};

pub const HOUSEHOLD_INCOME_FIELD: &str = "householdIncome";
pub const ANNUAL_INCOME_FIELD: &str = "annualHouseholdIncome";
pub const DATE_OF_BIRTH_FIELD: &str = "dateOfBirth";
pub const AGE_FIELD: &str = "age";

/// Builds the evaluation context for `profile`.
///
/// Household income is reported annually and every rule compares against monthly limits, so
/// `householdIncome` is rewritten to the monthly figure (annual / 12, rounded half away from
/// zero) and the reported figure is kept under `annualHouseholdIncome`. `age` is filled in
/// from `dateOfBirth` when it was not reported directly. An income that cannot be converted is
/// moved to `annualHouseholdIncome` so rules see `householdIncome` as missing.
pub fn prepare_data_context(profile: &HouseholdProfile, as_of: NaiveDate) -> Value {
    let mut fields: Map<String, Value> = profile.fields.clone();

    let reported =
        fields.get(HOUSEHOLD_INCOME_FIELD).filter(|value| !is_blank(Some(*value))).cloned();
    if let Some(reported) = reported {
        let converted = decimal_from(&reported)
            .and_then(|annual| monthly_income(annual).map(|monthly| (annual, monthly)));
        match converted {
            Some((annual, monthly)) => {
                fields.insert(ANNUAL_INCOME_FIELD.to_string(), decimal_value(annual));
                fields.insert(HOUSEHOLD_INCOME_FIELD.to_string(), monthly);
            }
            None => {
                tracing::warn!(
                    event_name = "eligibility.income_unconverted",
                    profile_id = %profile.id.0,
                    reported = %reported,
                    "household income could not be converted to a monthly figure"
                );
                fields.remove(HOUSEHOLD_INCOME_FIELD);
                fields.insert(ANNUAL_INCOME_FIELD.to_string(), reported);
            }
        }
    }

    let age_missing = is_blank(fields.get(AGE_FIELD));
    if age_missing {
        let age = fields
            .get(DATE_OF_BIRTH_FIELD)
            .and_then(Value::as_str)
            .and_then(parse_date)
            .map(|dob| age_on(dob, as_of));
        if let Some(age) = age {
            fields.insert(AGE_FIELD.to_string(), Value::from(age));
        }
    }

    Value::Object(fields)
}

/// Annual to monthly, rounded to whole currency units.
pub fn monthly_income(annual: Decimal) -> Option<Value> {
    let monthly = (annual / Decimal::from(12))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    monthly.to_i64().map(Value::from)
}

/// Required fields that are absent, `null`, blank strings or empty arrays in `context`.
pub fn missing_fields<'a>(
    context: &Value,
    required: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    required
        .into_iter()
        .filter(|field| is_blank(lookup_path(context, field)))
        .cloned()
        .collect()
}

fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(Decimal::from)
            .or_else(|| number.as_f64().and_then(Decimal::from_f64)),
        Value::String(text) => text.trim().replace(',', "").parse::<Decimal>().ok(),
        _ => None,
    }
}

fn decimal_value(value: Decimal) -> Value {
    match value.to_i64() {
        Some(whole) if value.fract().is_zero() => Value::from(whole),
        _ => value.to_f64().map(Value::from).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{missing_fields, monthly_income, prepare_data_context};
    use crate::eligibility::HouseholdProfile;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).expect("valid date")
    }

    fn profile(fields: serde_json::Value) -> HouseholdProfile {
        let serde_json::Value::Object(fields) = fields else {
            panic!("fields must be an object");
        };
        HouseholdProfile::new("p-1", fields)
    }

    #[test]
    fn annual_income_becomes_rounded_monthly_income() {
        let context = prepare_data_context(&profile(json!({"householdIncome": 50000})), as_of());
        assert_eq!(context["householdIncome"], json!(4167));
        assert_eq!(context["annualHouseholdIncome"], json!(50000));
    }

    #[test]
    fn income_strings_are_accepted() {
        let context =
            prepare_data_context(&profile(json!({"householdIncome": "18,000"})), as_of());
        assert_eq!(context["householdIncome"], json!(1500));
    }

    #[test]
    fn unconvertible_income_is_withheld_from_rules() {
        for reported in [json!("about 20k"), json!(1e30), json!(true)] {
            let context = prepare_data_context(
                &profile(json!({"householdIncome": reported.clone()})),
                as_of(),
            );
            assert!(context.get("householdIncome").is_none(), "{reported}");
            assert_eq!(context["annualHouseholdIncome"], reported);

            let required = ["householdIncome".to_string()];
            assert_eq!(missing_fields(&context, required.iter()), vec!["householdIncome"]);
        }

        let blank = prepare_data_context(&profile(json!({"householdIncome": null})), as_of());
        assert_eq!(blank["householdIncome"], json!(null));
        assert!(blank.get("annualHouseholdIncome").is_none());
    }

    #[test]
    fn midpoints_round_away_from_zero() {
        assert_eq!(monthly_income(Decimal::from(6)), Some(json!(1)));
        assert_eq!(monthly_income(Decimal::from(18)), Some(json!(2)));
        assert_eq!(monthly_income(Decimal::from(17)), Some(json!(1)));
    }

    #[test]
    fn age_is_derived_only_when_absent() {
        let derived = prepare_data_context(&profile(json!({"dateOfBirth": "1990-06-16"})), as_of());
        assert_eq!(derived["age"], json!(33));

        let reported =
            prepare_data_context(&profile(json!({"dateOfBirth": "1990-06-16", "age": 40})), as_of());
        assert_eq!(reported["age"], json!(40));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let context = json!({"age": 30, "zip": "", "members": [], "income": null});
        let required = ["age", "zip", "members", "income", "citizenship"].map(String::from);
        assert_eq!(
            missing_fields(&context, required.iter()),
            vec!["zip", "members", "income", "citizenship"]
        );
    }
}
