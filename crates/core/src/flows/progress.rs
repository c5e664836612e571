use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::QuestionnaireConfig;
use crate::flows::graph::FlowGraph;
use crate::flows::skip::SkipLogicManager;
use crate::rules::Interpreter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Unanswered,
    Answered,
    /// Deliberately passed over by the user. Only counts as done for optional questions.
    Skipped,
}

impl QuestionStatus {
    fn resolves(self, required: bool) -> bool {
        match self {
            Self::Answered => true,
            Self::Skipped => !required,
            Self::Unanswered => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlowProgress {
    pub total_questions: usize,
    pub required_questions: usize,
    pub answered_questions: usize,
    pub answered_required_questions: usize,
    pub remaining_questions: usize,
    pub remaining_required_questions: usize,
    /// 1-based position among visible questions, 0 when the current node is off the path.
    pub current_question_position: usize,
    pub progress_percent: u8,
    pub required_progress_percent: u8,
    pub estimated_seconds_remaining: u64,
    pub is_complete: bool,
}

/// Blends required and overall completion into one percentage.
///
/// `progress = round(w * required% + (1 - w) * overall%)` with `w = required_weight_pct / 100`.
/// With no required questions, required% falls back to overall%. Only questions visible for the
/// current answers are counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressTracker {
    required_weight_pct: u8,
    seconds_per_question: u32,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::from_config(&QuestionnaireConfig::default())
    }
}

impl ProgressTracker {
    pub fn new(required_weight_pct: u8, seconds_per_question: u32) -> Self {
        Self { required_weight_pct: required_weight_pct.min(100), seconds_per_question }
    }

    pub fn from_config(config: &QuestionnaireConfig) -> Self {
        Self::new(config.required_weight_pct, config.seconds_per_question)
    }

    /// `statuses` is keyed by question id; questions without an entry are unanswered.
    pub fn calculate_progress(
        &self,
        interpreter: &Interpreter,
        graph: &FlowGraph,
        skip_logic: &SkipLogicManager,
        statuses: &HashMap<String, QuestionStatus>,
        context: &Value,
        current_node_id: Option<&str>,
    ) -> FlowProgress {
        let visible = graph.traversal_order(interpreter, skip_logic, context);

        let status_of = |question_id: &str| statuses.get(question_id).copied().unwrap_or_default();

        let total_questions = visible.len();
        let required_questions = visible.iter().filter(|node| node.required).count();
        let answered_questions = visible
            .iter()
            .filter(|node| status_of(&node.question_id).resolves(node.required))
            .count();
        let answered_required_questions = visible
            .iter()
            .filter(|node| node.required && status_of(&node.question_id).resolves(true))
            .count();

        let current_question_position = current_node_id
            .and_then(|current| visible.iter().position(|node| node.id == current))
            .map_or(0, |index| index + 1);

        let overall = ratio(answered_questions, total_questions);
        let required_share = if required_questions == 0 {
            overall
        } else {
            ratio(answered_required_questions, required_questions)
        };
        let weight = u64::from(self.required_weight_pct);
        let blended = (
            weight * required_share.0 * overall.1 + (100 - weight) * overall.0 * required_share.1,
            required_share.1 * overall.1,
        );

        let remaining_questions = total_questions - answered_questions;
        let remaining_required_questions = required_questions - answered_required_questions;

        FlowProgress {
            total_questions,
            required_questions,
            answered_questions,
            answered_required_questions,
            remaining_questions,
            remaining_required_questions,
            current_question_position,
            progress_percent: rounded_percent(blended),
            required_progress_percent: rounded_percent((100 * required_share.0, required_share.1)),
            estimated_seconds_remaining: remaining_questions as u64
                * u64::from(self.seconds_per_question),
            is_complete: remaining_required_questions == 0,
        }
    }
}

/// Completion as an exact fraction; an empty set is fully complete.
fn ratio(part: usize, whole: usize) -> (u64, u64) {
    if whole == 0 {
        (1, 1)
    } else {
        (part as u64, whole as u64)
    }
}

/// Rounds `numerator / denominator` half up. Integer math keeps `x.5` boundaries exact.
fn rounded_percent((numerator, denominator): (u64, u64)) -> u8 {
    let rounded = (2 * numerator + denominator) / (2 * denominator);
    rounded.min(100) as u8
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::{ProgressTracker, QuestionStatus};
    use crate::flows::graph::{FlowGraph, FlowNode};
    use crate::flows::skip::SkipLogicManager;
    use crate::rules::{Interpreter, RuleTree};

    fn graph() -> FlowGraph {
        FlowGraph::new(
            "intake",
            "n1",
            vec![
                FlowNode::new("n1", "q1").then("n2"),
                FlowNode::new("n2", "q2").then("n3"),
                FlowNode::new("n3", "q3").optional().then("n4"),
                FlowNode::new("n4", "q4")
                    .show_if(RuleTree::parse(&json!({"var": "hasChildren"})).expect("valid rule")),
            ],
        )
    }

    fn statuses(answered: &[&str]) -> HashMap<String, QuestionStatus> {
        answered.iter().map(|id| (id.to_string(), QuestionStatus::Answered)).collect()
    }

    #[test]
    fn blends_required_and_overall_completion() {
        let tracker = ProgressTracker::default();
        let progress = tracker.calculate_progress(
            &Interpreter::default(),
            &graph(),
            &SkipLogicManager::default(),
            &statuses(&["q1"]),
            &json!({"hasChildren": false}),
            Some("n2"),
        );

        assert_eq!(progress.total_questions, 3);
        assert_eq!(progress.required_questions, 2);
        assert_eq!(progress.answered_questions, 1);
        assert_eq!(progress.current_question_position, 2);
        assert_eq!(progress.required_progress_percent, 50);
        // 0.7 * 50 + 0.3 * 33.3
        assert_eq!(progress.progress_percent, 45);
        assert_eq!(progress.estimated_seconds_remaining, 60);
        assert!(!progress.is_complete);
    }

    #[test]
    fn answering_required_questions_never_lowers_progress() {
        let tracker = ProgressTracker::default();
        let interpreter = Interpreter::default();
        let context = json!({"hasChildren": true});
        let mut previous = 0;
        let mut answered = Vec::new();

        for question in ["q1", "q2", "q4"] {
            answered.push(question);
            let progress = tracker.calculate_progress(
                &interpreter,
                &graph(),
                &SkipLogicManager::default(),
                &statuses(&answered),
                &context,
                None,
            );
            assert!(progress.progress_percent >= previous);
            previous = progress.progress_percent;
        }
        assert_eq!(previous, 93);
    }

    #[test]
    fn skipped_optional_questions_count_as_done() {
        let mut states = statuses(&["q1", "q2"]);
        states.insert("q3".to_string(), QuestionStatus::Skipped);
        let progress = ProgressTracker::default().calculate_progress(
            &Interpreter::default(),
            &graph(),
            &SkipLogicManager::default(),
            &states,
            &json!({}),
            Some("n9"),
        );

        assert_eq!(progress.progress_percent, 100);
        assert_eq!(progress.current_question_position, 0);
        assert!(progress.is_complete);
    }

    #[test]
    fn flows_without_visible_questions_are_complete() {
        let graph = FlowGraph::new(
            "empty",
            "n1",
            vec![FlowNode::new("n1", "q1").show_if(RuleTree::literal(false))],
        );
        let progress = ProgressTracker::default().calculate_progress(
            &Interpreter::default(),
            &graph,
            &SkipLogicManager::default(),
            &HashMap::new(),
            &json!({}),
            None,
        );

        assert_eq!(progress.total_questions, 0);
        assert_eq!(progress.progress_percent, 100);
        assert_eq!(progress.required_progress_percent, 100);
        assert!(progress.is_complete);
    }
}
