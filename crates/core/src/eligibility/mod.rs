pub mod context;
pub mod explanation;
pub mod orchestrator;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rules::{CriterionResult, RuleTree};

pub use explanation::EligibilityExplanation;
pub use orchestrator::EligibilityOrchestrator;
pub use store::{EligibilityStore, InMemoryEligibilityStore, StoreDocument, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

macro_rules! id_display {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

id_display!(ProfileId, ProgramId, RuleId);

/// Self-reported household data, keyed by field name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HouseholdProfile {
    pub id: ProfileId,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl HouseholdProfile {
    pub fn new(id: impl Into<ProfileId>, fields: Map<String, Value>) -> Self {
        Self { id: id.into(), fields }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitProgram {
    pub id: ProgramId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl BenefitProgram {
    pub fn new(id: impl Into<ProgramId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            jurisdiction: None,
            active: true,
        }
    }
}

/// One versioned eligibility rule. Revisions produce a new value; stored versions never change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EligibilityRule {
    pub id: RuleId,
    pub program_id: ProgramId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub logic: RuleTree,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EligibilityRule {
    pub fn new(
        id: impl Into<RuleId>,
        program_id: impl Into<ProgramId>,
        name: impl Into<String>,
        logic: RuleTree,
    ) -> Self {
        Self {
            id: id.into(),
            program_id: program_id.into(),
            name: name.into(),
            description: String::new(),
            logic,
            priority: 0,
            active: true,
            required_fields: Vec::new(),
            explanation: String::new(),
            required_documents: Vec::new(),
            version: default_version(),
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_required_documents<I, S>(mut self, documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_documents = documents.into_iter().map(Into::into).collect();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// The next version of this rule, carrying the updated logic.
    pub fn revise(&self, logic: RuleTree) -> Self {
        Self { logic, version: self.version + 1, created_at: Utc::now(), ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EligibilityResult {
    pub id: String,
    pub profile_id: ProfileId,
    pub program_id: ProgramId,
    pub eligible: bool,
    /// 95 when every field was present and the representative rule evaluated cleanly, 50 when
    /// required fields were missing, 0 when evaluation failed.
    pub confidence: u8,
    pub criteria: Vec<CriterionResult>,
    pub missing_fields: Vec<String>,
    pub rule_id: Option<RuleId>,
    pub rule_version: Option<u32>,
    pub explanation: EligibilityExplanation,
    pub required_documents: Vec<String>,
    pub needs_review: bool,
    pub error: Option<String>,
    pub execution_time_ms: f64,
    pub evaluated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}
