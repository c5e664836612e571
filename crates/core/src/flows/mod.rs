pub mod checkpoint;
pub mod engine;
pub mod graph;
pub mod navigation;
pub mod progress;
pub mod skip;
pub mod states;

/// Questionnaire answers keyed by question id. Doubles as the rule context.
pub type Answers = serde_json::Map<String, serde_json::Value>;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointManager};
pub use engine::{transition, QuestionnaireSession, SessionError, SessionTransitionError};
pub use graph::{Branch, FlowGraph, FlowGraphError, FlowNode, Successor};
pub use navigation::{NavigationError, NavigationHistory, NavigationManager, NavigationResult};
pub use progress::{FlowProgress, ProgressTracker, QuestionStatus};
pub use skip::{SkipLogicManager, SkipRule};
pub use states::{SessionEvent, SessionState, SessionTransition};
