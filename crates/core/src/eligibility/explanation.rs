use serde::{Deserialize, Serialize};

use crate::eligibility::{BenefitProgram, EligibilityRule};
use crate::errors::ApplicationError;
use crate::rules::CriterionResult;

/// Plain-text explanation attached to every eligibility result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityExplanation {
    pub reason: String,
    pub details: Vec<String>,
    pub rules_cited: Vec<String>,
}

pub(crate) fn explain(
    program: &BenefitProgram,
    representative: &EligibilityRule,
    eligible: bool,
    criteria: &[CriterionResult],
    missing_fields: &[String],
    rules_cited: Vec<String>,
) -> EligibilityExplanation {
    let reason = if representative.explanation.trim().is_empty() {
        if eligible {
            format!("You appear to meet the requirements for {}.", program.name)
        } else if missing_fields.is_empty() {
            format!("You do not appear to meet the requirement \"{}\".", representative.name)
        } else {
            format!(
                "We need more information to check the requirement \"{}\".",
                representative.name
            )
        }
    } else {
        representative.explanation.trim().to_string()
    };

    let mut details = criteria
        .iter()
        .filter(|criterion| !criterion.met)
        .map(|criterion| criterion.message.clone())
        .collect::<Vec<_>>();
    details.extend(missing_fields.iter().map(|field| format!("{field} was not provided")));

    EligibilityExplanation { reason, details, rules_cited }
}

pub(crate) fn fallback(error: &ApplicationError) -> EligibilityExplanation {
    let user_message = error.clone().into_interface("unassigned").user_message();
    EligibilityExplanation {
        reason: user_message.to_string(),
        details: vec![error.to_string()],
        rules_cited: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{explain, fallback};
    use crate::eligibility::{BenefitProgram, EligibilityRule};
    use crate::errors::ApplicationError;
    use crate::rules::{CriterionResult, RuleTree};

    fn income_rule() -> EligibilityRule {
        let logic = RuleTree::parse(&json!({"<=": [{"var": "householdIncome"}, 4000]}))
            .expect("valid rule");
        EligibilityRule::new("income", "snap", "Income limit", logic)
    }

    fn unmet() -> CriterionResult {
        CriterionResult {
            criterion: "householdIncome".to_string(),
            met: false,
            value: json!(4167),
            threshold: json!(4000),
            comparison: "<=".to_string(),
            message: "householdIncome is 4167, which does not meet the requirement <= 4000"
                .to_string(),
        }
    }

    #[test]
    fn authored_explanation_wins_over_generated_text() {
        let program = BenefitProgram::new("snap", "Food assistance");
        let rule = income_rule().with_explanation("Monthly income must be $4,000 or less.");

        let explanation =
            explain(&program, &rule, false, &[unmet()], &["zip".to_string()], vec!["income".into()]);

        assert_eq!(explanation.reason, "Monthly income must be $4,000 or less.");
        assert_eq!(
            explanation.details,
            vec![
                "householdIncome is 4167, which does not meet the requirement <= 4000".to_string(),
                "zip was not provided".to_string(),
            ]
        );
        assert_eq!(explanation.rules_cited, vec!["income"]);
    }

    #[test]
    fn generated_reason_names_the_rule_or_program() {
        let program = BenefitProgram::new("snap", "Food assistance");
        let rule = income_rule();

        assert_eq!(
            explain(&program, &rule, true, &[], &[], Vec::new()).reason,
            "You appear to meet the requirements for Food assistance."
        );
        assert_eq!(
            explain(&program, &rule, false, &[unmet()], &[], Vec::new()).reason,
            "You do not appear to meet the requirement \"Income limit\"."
        );
    }

    #[test]
    fn fallback_uses_the_user_safe_message() {
        let error = ApplicationError::NotFound { entity: "program", id: "tanf".to_string() };
        let explanation = fallback(&error);
        assert!(explanation.reason.starts_with("Some of the information needed"));
        assert_eq!(explanation.details, vec!["program `tanf` was not found".to_string()]);
    }
}
