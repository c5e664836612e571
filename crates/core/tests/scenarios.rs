use std::collections::HashMap;
use std::sync::Arc;

use benefits_core::eligibility::{
    BenefitProgram, EligibilityOrchestrator, EligibilityRule, HouseholdProfile,
    InMemoryEligibilityStore, ProfileId, ProgramId,
};
use benefits_core::flows::{
    Answers, Branch, CheckpointManager, FlowGraph, FlowNode, NavigationManager, ProgressTracker,
    QuestionStatus, SkipLogicManager, SkipRule,
};
use benefits_core::rules::{DetailedEvaluator, Interpreter, RuleTree, RuleValidator};
use chrono::NaiveDate;
use serde_json::{json, Value};

fn rule(value: Value) -> RuleTree {
    RuleTree::parse(&value).expect("valid rule")
}

fn sample_rules() -> Vec<Value> {
    vec![
        json!({">": [{"var": "age"}, 18]}),
        json!({"between": [{"var": "age"}, 18, 65]}),
        json!({"and": [
            {"<=": [{"var": "householdIncome"}, 4000]},
            {"or": [{"var": "hasChildren"}, {">=": [{"var": "age"}, 60]}]}
        ]}),
        json!({"if": [{"missing": ["zip"]}, false, {"in": [{"var": "zip"}, ["94110", "94103"]]}]}),
        json!({"some": [{"var": "members"}, {"<": [{"var": "age"}, 6]}]}),
    ]
}

fn sample_contexts() -> Vec<Value> {
    vec![
        json!({}),
        json!({"age": 25, "householdIncome": 3000, "hasChildren": true, "zip": "94110"}),
        json!({"age": 70, "householdIncome": 5000, "members": [{"age": 3}, {"age": 40}]}),
        json!({"age": null, "zip": ""}),
    ]
}

#[test]
fn scenario_greater_than_passes_for_adults() {
    let interpreter = Interpreter::default();
    let evaluation = DetailedEvaluator::new(&interpreter)
        .evaluate_json_with_details(&json!({">": [{"var": "age"}, 18]}), &json!({"age": 25}));

    assert_eq!(evaluation.result, json!(true));
    assert!(evaluation.success);
}

#[test]
fn scenario_between_is_inclusive_and_rejects_out_of_range() {
    let interpreter = Interpreter::default();
    let result = interpreter
        .evaluate_json(&json!({"between": [{"var": "age"}, 18, 65]}), &json!({"age": 70}))
        .expect("evaluates");

    assert_eq!(result, json!(false));
}

#[tokio::test]
async fn scenario_annual_income_is_converted_before_evaluation() {
    let store = InMemoryEligibilityStore::new();
    store
        .save_profile(HouseholdProfile::new(
            "household-1",
            json!({"householdIncome": 50000}).as_object().cloned().expect("object"),
        ))
        .expect("save profile");
    store.save_program(BenefitProgram::new("snap", "Food assistance")).expect("save program");
    store
        .save_rule(
            EligibilityRule::new(
                "snap-income",
                "snap",
                "Income limit",
                rule(json!({"<=": [{"var": "householdIncome"}, 4000]})),
            )
            .with_required_fields(["householdIncome"]),
        )
        .expect("save rule");

    let orchestrator = EligibilityOrchestrator::new(store, Arc::new(Interpreter::default()))
        .with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 15).expect("valid date"));
    let result = orchestrator
        .evaluate_eligibility(&ProfileId::from("household-1"), &ProgramId::from("snap"))
        .await;

    assert!(!result.eligible);
    assert_eq!(result.confidence, 95);
    let criterion = &result.criteria[0];
    assert_eq!(criterion.value, json!(4167));
    assert_eq!(criterion.threshold, json!(4000));
    assert_eq!(criterion.comparison, "<=");
    assert!(!criterion.met);
}

fn children_graph() -> FlowGraph {
    FlowGraph::new(
        "household",
        "node1",
        vec![
            FlowNode::new("node1", "q1").then("node2"),
            FlowNode::new("node2", "q2")
                .show_if(rule(json!({"==": [{"var": "hasChildren"}, true]})))
                .then("node3"),
            FlowNode::new("node3", "q3"),
        ],
    )
}

#[test]
fn scenario_hidden_node_is_skipped_forward_and_backward() {
    let interpreter = Interpreter::default();
    let mut navigation = NavigationManager::new(children_graph(), SkipLogicManager::default());
    let context = json!({"hasChildren": false});

    let forward = navigation.navigate_forward(&interpreter, "node1", &context);
    assert!(forward.success);
    assert_eq!(forward.target_node_id.as_deref(), Some("node3"));
    assert_eq!(forward.questions_skipped, vec!["q2"]);

    let backward = navigation.navigate_backward("node3");
    assert!(backward.success);
    assert_eq!(backward.target_node_id.as_deref(), Some("node1"));
}

#[test]
fn scenario_highest_priority_branch_is_taken() {
    let interpreter = Interpreter::default();
    let graph = FlowGraph::new(
        "branching",
        "node1",
        vec![
            FlowNode::new("node1", "q1")
                .with_branch(
                    Branch::new("high", rule(json!({">=": [{"var": "value"}, 50]})), "node3")
                        .with_priority(1),
                )
                .with_branch(
                    Branch::new("low", rule(json!({"<": [{"var": "value"}, 50]})), "node2")
                        .with_priority(0),
                ),
            FlowNode::new("node2", "q2"),
            FlowNode::new("node3", "q3"),
        ],
    );
    let mut navigation = NavigationManager::new(graph, SkipLogicManager::default());

    let result = navigation.navigate_forward(&interpreter, "node1", &json!({"value": 75}));
    assert_eq!(result.target_node_id.as_deref(), Some("node3"));
    assert!(result.branch_taken);
}

#[test]
fn scenario_zero_question_flow_is_complete() {
    let graph = FlowGraph::new(
        "empty",
        "node1",
        vec![FlowNode::new("node1", "q1").show_if(RuleTree::literal(false))],
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
}

#[test]
fn evaluation_is_deterministic() {
    let interpreter = Interpreter::default();
    for raw in sample_rules() {
        let tree = rule(raw);
        for context in sample_contexts() {
            let first = interpreter.evaluate(&tree, &context);
            let second = interpreter.evaluate(&tree, &context);
            assert_eq!(first, second, "rule {tree} with {context}");
        }
    }
}

#[test]
fn validator_lists_every_reachable_variable_and_operator() {
    let interpreter = Interpreter::default();
    let validator = RuleValidator::new(&interpreter);
    let report = validator.validate(&json!({"and": [
        {"<=": [{"var": "householdIncome"}, 4000]},
        {"or": [{"var": "hasChildren"}, {">=": [{"var": "age"}, 60]}]},
        {"<=": [{"var": "householdIncome"}, {"*": [{"var": "householdSize"}, 1500]}]}
    ]}));

    assert!(report.valid);
    assert_eq!(report.variables, vec!["householdIncome", "hasChildren", "age", "householdSize"]);
    assert_eq!(report.operators, vec!["and", "<=", "or", ">=", "*"]);
}

#[test]
fn detailed_and_plain_evaluation_agree() {
    let interpreter = Interpreter::default();
    let detailed = DetailedEvaluator::new(&interpreter);
    for raw in sample_rules() {
        let tree = rule(raw);
        for context in sample_contexts() {
            let plain = interpreter.evaluate(&tree, &context);
            let evaluation = detailed.evaluate_with_details(&tree, &context);
            match plain {
                Ok(value) => {
                    assert!(evaluation.success);
                    assert_eq!(evaluation.result, value, "rule {tree} with {context}");
                }
                Err(_) => assert!(!evaluation.success),
            }
        }
    }
}

#[test]
fn backward_navigation_never_surfaces_skipped_questions() {
    let interpreter = Interpreter::default();
    let graph = FlowGraph::new(
        "intake",
        "n1",
        vec![
            FlowNode::new("n1", "q1").then("n2"),
            FlowNode::new("n2", "q2").then("n3"),
            FlowNode::new("n3", "q3")
                .show_if(rule(json!({"var": "hasChildren"})))
                .then("n4"),
            FlowNode::new("n4", "q4").then("n5"),
            FlowNode::new("n5", "q5"),
        ],
    );
    let skip = SkipLogicManager::new(vec![SkipRule::new(
        "owners",
        rule(json!({"==": [{"var": "housing"}, "own"]})),
        ["q4"],
    )]);
    let mut navigation = NavigationManager::new(graph, skip);
    let context = json!({"hasChildren": false, "housing": "own"});

    let mut skipped = Vec::new();
    let mut current = "n1".to_string();
    navigation.navigate_start(&interpreter, &context);
    loop {
        let step = navigation.navigate_forward(&interpreter, &current, &context);
        if !step.success {
            break;
        }
        skipped.extend(step.questions_skipped);
        current = step.target_node_id.expect("successful steps have a target");
    }
    assert_eq!(skipped, vec!["q3", "q4"]);

    let mut surfaced = Vec::new();
    loop {
        let step = navigation.navigate_backward(&current);
        if !step.success {
            break;
        }
        current = step.target_node_id.expect("successful steps have a target");
        surfaced.push(current.clone());
    }

    assert_eq!(current, "n1");
    assert_eq!(surfaced, vec!["n2", "n1"]);
    assert!(surfaced.iter().all(|node| node != "n3" && node != "n4"));
}

#[test]
fn answering_required_questions_never_lowers_progress() {
    let interpreter = Interpreter::default();
    let graph = FlowGraph::new(
        "intake",
        "n1",
        vec![
            FlowNode::new("n1", "q1").then("n2"),
            FlowNode::new("n2", "q2").optional().then("n3"),
            FlowNode::new("n3", "q3").then("n4"),
            FlowNode::new("n4", "q4").optional().then("n5"),
            FlowNode::new("n5", "q5"),
        ],
    );
    let tracker = ProgressTracker::default();
    let skip = SkipLogicManager::default();

    for optional_answered in [false, true] {
        let mut statuses = HashMap::new();
        if optional_answered {
            statuses.insert("q2".to_string(), QuestionStatus::Answered);
        }

        let mut previous = 0;
        for question in ["q1", "q3", "q5"] {
            statuses.insert(question.to_string(), QuestionStatus::Answered);
            let progress =
                tracker.calculate_progress(&interpreter, &graph, &skip, &statuses, &json!({}), None);
            assert!(progress.progress_percent >= previous);
            previous = progress.progress_percent;
        }
        assert!(previous >= 70);
    }
}

#[test]
fn restored_checkpoints_are_equal_but_independent() {
    let mut manager = CheckpointManager::default();
    let original: Answers = json!({"household": {"members": [{"age": 34}]}, "zip": "94110"})
        .as_object()
        .cloned()
        .expect("object");

    let id = manager.create("n3", "before income", &original).id;
    let mut restored = manager.restore(id).expect("checkpoint exists");
    assert_eq!(restored, original);

    restored["household"]["members"][0]["age"] = json!(35);
    assert_eq!(original["household"]["members"][0]["age"], json!(34));
    assert_eq!(manager.restore(id).expect("checkpoint exists"), original);
}
