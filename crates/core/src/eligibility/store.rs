use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eligibility::{BenefitProgram, EligibilityRule, HouseholdProfile, ProfileId, ProgramId, RuleId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Read side of the persistence layer the orchestrator depends on.
///
/// Lookups return `Ok(None)` for unknown ids; `Err` is reserved for the store itself failing.
#[async_trait]
pub trait EligibilityStore: Send + Sync {
    async fn find_profile(&self, id: &ProfileId) -> Result<Option<HouseholdProfile>, StoreError>;

    async fn find_program(&self, id: &ProgramId) -> Result<Option<BenefitProgram>, StoreError>;

    /// Latest version of every active rule of the program, in any order.
    async fn find_active_rules_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<EligibilityRule>, StoreError>;
}

/// Seed document accepted by [`InMemoryEligibilityStore::from_document`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub profiles: Vec<HouseholdProfile>,
    #[serde(default)]
    pub programs: Vec<BenefitProgram>,
    #[serde(default)]
    pub rules: Vec<EligibilityRule>,
}

#[derive(Default)]
struct StoreState {
    profiles: HashMap<ProfileId, HouseholdProfile>,
    programs: HashMap<ProgramId, BenefitProgram>,
    /// Every version of every rule, oldest first.
    rules: HashMap<RuleId, Vec<EligibilityRule>>,
    rule_order: Vec<RuleId>,
}

#[derive(Default)]
pub struct InMemoryEligibilityStore {
    state: RwLock<StoreState>,
}

impl InMemoryEligibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: StoreDocument) -> Result<Self, StoreError> {
        let store = Self::new();
        for profile in document.profiles {
            store.save_profile(profile)?;
        }
        for program in document.programs {
            store.save_program(program)?;
        }
        for rule in document.rules {
            store.save_rule(rule)?;
        }
        Ok(store)
    }

    pub fn save_profile(&self, profile: HouseholdProfile) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    pub fn save_program(&self, program: BenefitProgram) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.programs.insert(program.id.clone(), program);
        Ok(())
    }

    /// Appends a rule version. A version must be newer than every stored version of that rule.
    pub fn save_rule(&self, rule: EligibilityRule) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let id = rule.id.clone();
        if !state.rules.contains_key(&id) {
            state.rule_order.push(id.clone());
        }
        let versions = state.rules.entry(id).or_default();
        if let Some(latest) = versions.last() {
            if rule.version <= latest.version {
                return Err(StoreError::Decode(format!(
                    "rule `{}` version {} is not newer than stored version {}",
                    rule.id, rule.version, latest.version
                )));
            }
        }
        versions.push(rule);
        Ok(())
    }

    pub fn rule_versions(&self, id: &RuleId) -> Result<Vec<EligibilityRule>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.rules.get(id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl EligibilityStore for InMemoryEligibilityStore {
    async fn find_profile(&self, id: &ProfileId) -> Result<Option<HouseholdProfile>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.profiles.get(id).cloned())
    }

    async fn find_program(&self, id: &ProgramId) -> Result<Option<BenefitProgram>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.programs.get(id).cloned())
    }

    async fn find_active_rules_for_program(
        &self,
        program_id: &ProgramId,
    ) -> Result<Vec<EligibilityRule>, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .rule_order
            .iter()
            .filter_map(|id| state.rules.get(id).and_then(|versions| versions.last()))
            .filter(|rule| rule.active && &rule.program_id == program_id)
            .cloned()
            .collect())
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}
