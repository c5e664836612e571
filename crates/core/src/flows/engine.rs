use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::config::QuestionnaireConfig;
use crate::flows::checkpoint::{Checkpoint, CheckpointError, CheckpointManager};
use crate::flows::graph::FlowGraph;
use crate::flows::navigation::{
    NavigationError, NavigationHistory, NavigationManager, NavigationResult,
};
use crate::flows::progress::{FlowProgress, ProgressTracker, QuestionStatus};
use crate::flows::skip::SkipLogicManager;
use crate::flows::states::{SessionEvent, SessionState, SessionTransition};
use crate::flows::Answers;
use crate::rules::Interpreter;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: SessionState, event: SessionEvent },
    #[error("cannot {action} while the session is {state:?}")]
    NotInProgress { state: SessionState, action: &'static str },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] SessionTransitionError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Session lifecycle: `not started -> in progress <-> paused -> completed`.
pub fn transition(
    current: SessionState,
    event: SessionEvent,
) -> Result<SessionTransition, SessionTransitionError> {
    use SessionEvent::{Complete, Pause, Resume, Start};
    use SessionState::{Completed, InProgress, NotStarted, Paused};

    if current.is_terminal() {
        return Err(SessionTransitionError::InvalidTransition { state: current, event });
    }
    let to = match (current, event) {
        (NotStarted, Start) => InProgress,
        (InProgress, Pause) => Paused,
        (Paused, Resume) => InProgress,
        (InProgress, Complete) | (Paused, Complete) => Completed,
        _ => {
            return Err(SessionTransitionError::InvalidTransition { state: current, event });
        }
    };

    Ok(SessionTransition { from: current, to, event })
}

/// One user's pass through a questionnaire.
///
/// Answers double as the rule context for show-if, branch and skip conditions, so every
/// navigation call sees the latest answers. The current node only moves on a successful
/// navigation.
pub struct QuestionnaireSession {
    id: Uuid,
    interpreter: Arc<Interpreter>,
    navigation: NavigationManager,
    tracker: ProgressTracker,
    checkpoints: CheckpointManager,
    state: SessionState,
    current_node: Option<String>,
    answers: Answers,
    statuses: HashMap<String, QuestionStatus>,
    audit: Option<(Arc<dyn AuditSink>, AuditContext)>,
}

impl QuestionnaireSession {
    pub fn new(graph: FlowGraph, skip_logic: SkipLogicManager, interpreter: Arc<Interpreter>) -> Self {
        Self::from_config(graph, skip_logic, interpreter, &QuestionnaireConfig::default())
    }

    pub fn from_config(
        graph: FlowGraph,
        skip_logic: SkipLogicManager,
        interpreter: Arc<Interpreter>,
        config: &QuestionnaireConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            interpreter,
            navigation: NavigationManager::new(graph, skip_logic),
            tracker: ProgressTracker::from_config(config),
            checkpoints: CheckpointManager::from_config(config),
            state: SessionState::NotStarted,
            current_node: None,
            answers: Answers::new(),
            statuses: HashMap::new(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>, context: AuditContext) -> Self {
        self.audit = Some((sink, context));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn statuses(&self) -> &HashMap<String, QuestionStatus> {
        &self.statuses
    }

    pub fn history(&self) -> &NavigationHistory {
        self.navigation.history()
    }

    pub fn navigation(&self) -> &NavigationManager {
        &self.navigation
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// The answers as a rule context.
    pub fn context(&self) -> Value {
        Value::Object(self.answers.clone())
    }

    /// Moves to the first visible node. The session stays not started if there is none.
    pub fn start(&mut self) -> Result<NavigationResult, SessionError> {
        let planned = self.check(transition(self.state, SessionEvent::Start))?;

        let context = self.context();
        let result = self.navigation.navigate_start(&self.interpreter, &context);
        if result.success {
            self.current_node = result.target_node_id.clone();
            self.apply(planned);
        }
        Ok(result)
    }

    pub fn answer(
        &mut self,
        question_id: impl Into<String>,
        value: Value,
    ) -> Result<(), SessionTransitionError> {
        self.require_in_progress("answer")?;
        let question_id = question_id.into();
        self.statuses.insert(question_id.clone(), QuestionStatus::Answered);
        self.answers.insert(question_id, value);
        Ok(())
    }

    /// Passes over an optional question without answering it.
    pub fn skip_question(&mut self, question_id: impl Into<String>) -> Result<(), SessionTransitionError> {
        self.require_in_progress("skip a question")?;
        let question_id = question_id.into();
        self.answers.remove(&question_id);
        self.statuses.insert(question_id, QuestionStatus::Skipped);
        Ok(())
    }

    /// Advances from the current node. Running off the end of the flow completes the session.
    pub fn next(&mut self) -> Result<NavigationResult, SessionError> {
        let from = self.require_current("move forward")?;
        let context = self.context();
        let result = self.navigation.navigate_forward(&self.interpreter, &from, &context);

        if result.success {
            self.current_node = result.target_node_id.clone();
        } else if matches!(result.error, Some(NavigationError::EndOfFlow(_))) {
            self.complete()?;
        }
        Ok(result)
    }

    pub fn back(&mut self) -> Result<NavigationResult, SessionError> {
        let from = self.require_current("move back")?;
        let result = self.navigation.navigate_backward(&from);
        if result.success {
            self.current_node = result.target_node_id.clone();
        }
        Ok(result)
    }

    pub fn pause(&mut self) -> Result<SessionTransition, SessionTransitionError> {
        self.fire(SessionEvent::Pause)
    }

    pub fn resume(&mut self) -> Result<SessionTransition, SessionTransitionError> {
        self.fire(SessionEvent::Resume)
    }

    pub fn complete(&mut self) -> Result<SessionTransition, SessionTransitionError> {
        self.fire(SessionEvent::Complete)
    }

    pub fn progress(&self) -> FlowProgress {
        self.tracker.calculate_progress(
            &self.interpreter,
            self.navigation.graph(),
            self.navigation.skip_logic(),
            &self.statuses,
            &self.context(),
            self.current_node.as_deref(),
        )
    }

    pub fn create_checkpoint(&mut self, name: impl Into<String>) -> Result<Checkpoint, SessionError> {
        let node_id = self.current_node.clone().ok_or(SessionTransitionError::NotInProgress {
            state: self.state,
            action: "create a checkpoint",
        })?;
        let mut skipped = self
            .statuses
            .iter()
            .filter(|(_, status)| **status == QuestionStatus::Skipped)
            .map(|(question_id, _)| question_id.clone())
            .collect::<Vec<_>>();
        skipped.sort();
        let checkpoint =
            self.checkpoints.create_with_skipped(node_id, name, &self.answers, skipped).clone();
        self.record_checkpoint("session.checkpoint_created", &checkpoint);
        Ok(checkpoint)
    }

    /// Rewinds answers, statuses and position to a checkpoint. History is truncated to the
    /// checkpoint's node when that node was visited, and restarted from it otherwise.
    pub fn restore_checkpoint(&mut self, id: Uuid) -> Result<(), SessionError> {
        self.require_in_progress("restore a checkpoint")?;
        let checkpoint = self.checkpoints.get(id).cloned().ok_or(CheckpointError::NotFound(id))?;
        let answers = self.checkpoints.restore(id)?;
        let node_id = checkpoint.node_id.clone();

        if !self.navigation.navigate_to(&node_id).success {
            self.navigation.replace_history(NavigationHistory::new().push(node_id.clone()));
        }

        self.statuses.clear();
        for question_id in &checkpoint.skipped {
            self.statuses.insert(question_id.clone(), QuestionStatus::Skipped);
        }
        for question_id in answers.keys() {
            self.statuses.insert(question_id.clone(), QuestionStatus::Answered);
        }
        self.answers = answers;
        self.current_node = Some(node_id);

        self.record_checkpoint("session.checkpoint_restored", &checkpoint);
        Ok(())
    }

    fn fire(&mut self, event: SessionEvent) -> Result<SessionTransition, SessionTransitionError> {
        let planned = self.check(transition(self.state, event))?;
        self.apply(planned);
        Ok(planned)
    }

    fn check(
        &self,
        result: Result<SessionTransition, SessionTransitionError>,
    ) -> Result<SessionTransition, SessionTransitionError> {
        if let Err(error) = &result {
            tracing::debug!(
                event_name = "flows.session_transition",
                session_id = %self.id,
                outcome = "rejected",
                error = %error,
                "session transition rejected"
            );
            self.emit(
                "session.transition_rejected",
                AuditCategory::Session,
                AuditOutcome::Rejected,
                vec![("error", error.to_string())],
            );
        }
        result
    }

    fn apply(&mut self, planned: SessionTransition) {
        self.state = planned.to;
        tracing::debug!(
            event_name = "flows.session_transition",
            session_id = %self.id,
            from = ?planned.from,
            to = ?planned.to,
            event = ?planned.event,
            "session transition applied"
        );
        self.emit(
            "session.transition_applied",
            AuditCategory::Session,
            AuditOutcome::Success,
            vec![
                ("from", format!("{:?}", planned.from)),
                ("to", format!("{:?}", planned.to)),
                ("event", format!("{:?}", planned.event)),
            ],
        );
    }

    fn require_in_progress(&self, action: &'static str) -> Result<(), SessionTransitionError> {
        if self.state == SessionState::InProgress {
            Ok(())
        } else {
            Err(SessionTransitionError::NotInProgress { state: self.state, action })
        }
    }

    fn require_current(&self, action: &'static str) -> Result<String, SessionTransitionError> {
        self.require_in_progress(action)?;
        self.current_node
            .clone()
            .ok_or(SessionTransitionError::NotInProgress { state: self.state, action })
    }

    fn record_checkpoint(&self, event_type: &str, checkpoint: &Checkpoint) {
        self.emit(
            event_type,
            AuditCategory::Checkpoint,
            AuditOutcome::Success,
            vec![
                ("checkpoint_id", checkpoint.id.to_string()),
                ("node_id", checkpoint.node_id.clone()),
            ],
        );
    }

    fn emit(
        &self,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: Vec<(&str, String)>,
    ) {
        let Some((sink, context)) = &self.audit else {
            return;
        };
        let event = metadata
            .into_iter()
            .fold(context.event(event_type, category, outcome), |event, (key, value)| {
                event.with_metadata(key, value)
            })
            .with_metadata("session_id", self.id.to_string());
        sink.emit(event);
    }
}
