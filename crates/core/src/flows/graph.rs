use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::flows::skip::SkipLogicManager;
use crate::rules::{Interpreter, RuleTree};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowGraphError {
    #[error("flow has no nodes")]
    Empty,
    #[error("start node `{0}` is not part of the flow")]
    UnknownStart(String),
    #[error("node id `{0}` is declared more than once")]
    DuplicateNode(String),
    #[error("node `{node}` points to unknown node `{target}`")]
    DanglingTarget { node: String, target: String },
}

/// A conditional edge. When several branch conditions hold, the highest priority wins and
/// ties go to the branch declared first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub condition: RuleTree,
    pub target: String,
    #[serde(default)]
    pub priority: i32,
}

impl Branch {
    pub fn new(id: impl Into<String>, condition: RuleTree, target: impl Into<String>) -> Self {
        Self { id: id.into(), condition, target: target.into(), priority: 0 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub question_id: String,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub show_if: Option<RuleTree>,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, question_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question_id: question_id.into(),
            next: None,
            branches: Vec::new(),
            show_if: None,
            required: true,
        }
    }

    pub fn then(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    pub fn show_if(mut self, condition: RuleTree) -> Self {
        self.show_if = Some(condition);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Where to go after a node: the winning branch target, else the default successor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Successor {
    pub target: Option<String>,
    pub branch_id: Option<String>,
}

impl Successor {
    pub fn branch_taken(&self) -> bool {
        self.branch_id.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub id: String,
    pub start: String,
    pub nodes: Vec<FlowNode>,
}

impl FlowGraph {
    pub fn new(id: impl Into<String>, start: impl Into<String>, nodes: Vec<FlowNode>) -> Self {
        Self { id: id.into(), start: start.into(), nodes }
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn validate(&self) -> Result<(), FlowGraphError> {
        if self.nodes.is_empty() {
            return Err(FlowGraphError::Empty);
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(FlowGraphError::DuplicateNode(node.id.clone()));
            }
        }

        if !seen.contains(self.start.as_str()) {
            return Err(FlowGraphError::UnknownStart(self.start.clone()));
        }

        for node in &self.nodes {
            let targets = node.next.iter().chain(node.branches.iter().map(|branch| &branch.target));
            for target in targets {
                if !seen.contains(target.as_str()) {
                    return Err(FlowGraphError::DanglingTarget {
                        node: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Resolves the next node after `node` for the current answers.
    pub fn successor(&self, node: &FlowNode, interpreter: &Interpreter, context: &Value) -> Successor {
        let mut winner: Option<&Branch> = None;
        for branch in &node.branches {
            if winner.is_some_and(|current| current.priority >= branch.priority) {
                continue;
            }
            if interpreter.evaluate_condition(&branch.condition, context) {
                winner = Some(branch);
            }
        }

        match winner {
            Some(branch) => {
                Successor { target: Some(branch.target.clone()), branch_id: Some(branch.id.clone()) }
            }
            None => Successor { target: node.next.clone(), branch_id: None },
        }
    }

    /// Whether the node's own show-if condition holds. Nodes without one are always shown.
    pub fn is_shown(&self, node: &FlowNode, interpreter: &Interpreter, context: &Value) -> bool {
        node.show_if
            .as_ref()
            .map_or(true, |condition| interpreter.evaluate_condition(condition, context))
    }

    /// Nodes a user would actually be asked, walking from `start` with the current answers.
    ///
    /// Hidden and skipped nodes are passed through but not listed. The walk ends at a node with
    /// no successor, at an unknown id, or on the first revisit.
    pub fn traversal_order<'g>(
        &'g self,
        interpreter: &Interpreter,
        skip_logic: &SkipLogicManager,
        context: &Value,
    ) -> Vec<&'g FlowNode> {
        let skipped = skip_logic.skipped_questions(interpreter, context);
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut cursor = Some(self.start.clone());

        while let Some(id) = cursor {
            let Some(node) = self.node(&id) else {
                break;
            };
            if !visited.insert(node.id.as_str()) {
                break;
            }
            if self.is_shown(node, interpreter, context) && !skipped.contains(&node.question_id) {
                order.push(node);
            }
            cursor = self.successor(node, interpreter, context).target;
        }

        order
    }
}

fn default_required() -> bool {
    true
}
