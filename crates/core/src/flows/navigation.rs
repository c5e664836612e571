use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::flows::graph::{FlowGraph, FlowNode, Successor};
use crate::flows::skip::SkipLogicManager;
use crate::rules::Interpreter;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "node_id", rename_all = "snake_case")]
pub enum NavigationError {
    #[error("node `{0}` is not part of the flow")]
    NodeNotFound(String),
    #[error("node `{0}` has no further questions")]
    EndOfFlow(String),
    #[error("skipping from `{0}` loops back on itself")]
    CycleDetected(String),
    #[error("there is no earlier question to return to")]
    HistoryExhausted,
    #[error("node `{0}` has not been visited")]
    NotVisited(String),
}

/// Stack of node ids the user was actually shown, oldest first.
///
/// Values are immutable: `push` and `pop` return a new history, so a navigation result can
/// carry the history it produced without aliasing the manager's copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NavigationHistory {
    stack: Vec<String>,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { stack: ids.into_iter().map(Into::into).collect() }
    }

    #[must_use]
    pub fn push(&self, node_id: impl Into<String>) -> Self {
        let mut stack = self.stack.clone();
        stack.push(node_id.into());
        Self { stack }
    }

    #[must_use]
    pub fn pop(&self) -> Self {
        let mut stack = self.stack.clone();
        stack.pop();
        Self { stack }
    }

    /// History up to and including the most recent visit to `node_id`.
    pub fn truncated_to(&self, node_id: &str) -> Option<Self> {
        let position = self.stack.iter().rposition(|id| id == node_id)?;
        Some(Self { stack: self.stack[..=position].to_vec() })
    }

    pub fn top(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.stack.iter().any(|id| id == node_id)
    }

    pub fn ids(&self) -> &[String] {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NavigationResult {
    pub success: bool,
    pub target_node_id: Option<String>,
    /// Question ids passed over on the way to the target.
    pub questions_skipped: Vec<String>,
    pub branch_taken: bool,
    pub branch_id: Option<String>,
    pub error: Option<NavigationError>,
    pub history: NavigationHistory,
}

impl NavigationResult {
    fn arrived(target: String, questions_skipped: Vec<String>, history: NavigationHistory) -> Self {
        Self {
            success: true,
            target_node_id: Some(target),
            questions_skipped,
            branch_taken: false,
            branch_id: None,
            error: None,
            history,
        }
    }

    fn via(mut self, successor: Successor) -> Self {
        self.branch_taken = successor.branch_taken();
        self.branch_id = successor.branch_id;
        self
    }

    fn failed(error: NavigationError, history: NavigationHistory) -> Self {
        tracing::debug!(event_name = "flows.navigation_failed", error = %error, "navigation failed");
        Self {
            success: false,
            target_node_id: None,
            questions_skipped: Vec::new(),
            branch_taken: false,
            branch_id: None,
            error: Some(error),
            history,
        }
    }
}

/// Moves through one session's flow graph and owns that session's history.
///
/// Show-if conditions and skip rules are re-evaluated on every call because answers may have
/// changed since a node was last visited. Backward navigation only replays history, which
/// holds nothing but nodes that were shown.
#[derive(Clone, Debug)]
pub struct NavigationManager {
    graph: FlowGraph,
    skip_logic: SkipLogicManager,
    history: NavigationHistory,
}

impl NavigationManager {
    pub fn new(graph: FlowGraph, skip_logic: SkipLogicManager) -> Self {
        Self { graph, skip_logic, history: NavigationHistory::new() }
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn skip_logic(&self) -> &SkipLogicManager {
        &self.skip_logic
    }

    pub fn skip_logic_mut(&mut self) -> &mut SkipLogicManager {
        &mut self.skip_logic
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    /// Restores a previously captured history, e.g. when resuming from a checkpoint.
    pub fn replace_history(&mut self, history: NavigationHistory) {
        self.history = history;
    }

    /// Resets the history and lands on the first visible node from `start`.
    pub fn navigate_start(&mut self, interpreter: &Interpreter, context: &Value) -> NavigationResult {
        let start = self.graph.start.clone();
        match self.settle(&start, interpreter, context) {
            Ok((target, skipped)) => {
                self.history = NavigationHistory::new().push(target.clone());
                NavigationResult::arrived(target, skipped, self.history.clone())
            }
            Err(error) => NavigationResult::failed(error, self.history.clone()),
        }
    }

    pub fn navigate_forward(
        &mut self,
        interpreter: &Interpreter,
        from_id: &str,
        context: &Value,
    ) -> NavigationResult {
        let Some(from) = self.graph.node(from_id) else {
            return NavigationResult::failed(
                NavigationError::NodeNotFound(from_id.to_string()),
                self.history.clone(),
            );
        };

        let successor = self.graph.successor(from, interpreter, context);
        let Some(candidate) = successor.target.clone() else {
            return NavigationResult::failed(
                NavigationError::EndOfFlow(from_id.to_string()),
                self.history.clone(),
            );
        };

        match self.settle(&candidate, interpreter, context) {
            Ok((target, skipped)) => {
                let base = if self.history.top() == Some(from_id) {
                    self.history.clone()
                } else {
                    self.history.push(from_id)
                };
                self.history = base.push(target.clone());
                NavigationResult::arrived(target, skipped, self.history.clone()).via(successor)
            }
            Err(NavigationError::EndOfFlow(_)) => NavigationResult::failed(
                NavigationError::EndOfFlow(from_id.to_string()),
                self.history.clone(),
            ),
            Err(error) => NavigationResult::failed(error, self.history.clone()),
        }
    }

    pub fn navigate_backward(&mut self, from_id: &str) -> NavigationResult {
        if !self.graph.contains(from_id) {
            return NavigationResult::failed(
                NavigationError::NodeNotFound(from_id.to_string()),
                self.history.clone(),
            );
        }

        let mut history = self.history.clone();
        while history.top() == Some(from_id) {
            history = history.pop();
        }

        match history.top().map(str::to_string) {
            Some(target) => {
                self.history = history;
                NavigationResult::arrived(target, Vec::new(), self.history.clone())
            }
            None => NavigationResult::failed(NavigationError::HistoryExhausted, self.history.clone()),
        }
    }

    /// Jumps back to a node already in the history, dropping everything visited after it.
    pub fn navigate_to(&mut self, node_id: &str) -> NavigationResult {
        if !self.graph.contains(node_id) {
            return NavigationResult::failed(
                NavigationError::NodeNotFound(node_id.to_string()),
                self.history.clone(),
            );
        }

        match self.history.truncated_to(node_id) {
            Some(history) => {
                self.history = history;
                NavigationResult::arrived(node_id.to_string(), Vec::new(), self.history.clone())
            }
            None => NavigationResult::failed(
                NavigationError::NotVisited(node_id.to_string()),
                self.history.clone(),
            ),
        }
    }

    /// Node ids a user would be shown, in traversal order, for the current answers.
    pub fn visible_questions(&self, interpreter: &Interpreter, context: &Value) -> Vec<String> {
        self.graph
            .traversal_order(interpreter, &self.skip_logic, context)
            .into_iter()
            .map(|node| node.id.clone())
            .collect()
    }

    pub fn is_node_visible(&self, node_id: &str, interpreter: &Interpreter, context: &Value) -> bool {
        self.graph
            .node(node_id)
            .is_some_and(|node| self.is_visible(node, interpreter, context))
    }

    fn is_visible(&self, node: &FlowNode, interpreter: &Interpreter, context: &Value) -> bool {
        self.graph.is_shown(node, interpreter, context)
            && !self.skip_logic.should_skip(&node.question_id, interpreter, context)
    }

    /// Walks from `candidate` past hidden or skipped nodes to the first one that is shown.
    fn settle(
        &self,
        candidate: &str,
        interpreter: &Interpreter,
        context: &Value,
    ) -> Result<(String, Vec<String>), NavigationError> {
        let mut skipped = Vec::new();
        let mut passed = HashSet::new();
        let mut current = candidate.to_string();

        loop {
            let node = self
                .graph
                .node(&current)
                .ok_or_else(|| NavigationError::NodeNotFound(current.clone()))?;

            if self.is_visible(node, interpreter, context) {
                return Ok((current, skipped));
            }

            if !passed.insert(node.id.clone()) {
                return Err(NavigationError::CycleDetected(node.id.clone()));
            }
            skipped.push(node.question_id.clone());

            current = self
                .graph
                .successor(node, interpreter, context)
                .target
                .ok_or_else(|| NavigationError::EndOfFlow(node.id.clone()))?;
        }
    }
}
