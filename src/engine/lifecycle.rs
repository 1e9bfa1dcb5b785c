//! Step engine lifecycle vocabulary.
//!
//! The store records these values but never enforces transitions; the
//! successor tables here exist so orchestrators and step handlers share one
//! definition of what a legal next value looks like.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::types::{Mutation, ParameterDocument};
use crate::storage::error::StoreError;

/// Reserved group and field names.
pub mod keys {
    pub const GLOBAL_PARAMETERS: &str = "global_parameters";

    pub const STEP_ENGINE_LIBRARY_PATH: &str = "step_engine_library_path";
    pub const STEP_ENGINE_INSTANCE_PATH: &str = "step_engine_instance_path";
    pub const STEP_ENGINE_STATE: &str = "step_engine_state";
    pub const CURRENT_STEP_MODULE: &str = "current_step_module";
    pub const CURRENT_STEP_NODE: &str = "current_step_node";
    pub const CURRENT_STEP_STATE: &str = "current_step_state";
    pub const FIRST_STEP_MODULE: &str = "first_step_module";
    pub const FIRST_STEP_NODE: &str = "first_step_node";
    pub const RUN_STEP_COUNT: &str = "run_step_count";
}

/// Overall lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Inactive,
    Startup,
    Running,
    CompleteSuccess,
    CompleteError,
}

impl EngineState {
    pub const ALL: [EngineState; 5] = [
        EngineState::Inactive,
        EngineState::Startup,
        EngineState::Running,
        EngineState::CompleteSuccess,
        EngineState::CompleteError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Inactive => "INACTIVE",
            EngineState::Startup => "STARTUP",
            EngineState::Running => "RUNNING",
            EngineState::CompleteSuccess => "COMPLETE_SUCCESS",
            EngineState::CompleteError => "COMPLETE_ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::CompleteSuccess | EngineState::CompleteError)
    }

    pub fn successors(self) -> &'static [EngineState] {
        match self {
            EngineState::Inactive => &[EngineState::Startup],
            EngineState::Startup => &[EngineState::Running],
            EngineState::Running => &[EngineState::CompleteSuccess, EngineState::CompleteError],
            EngineState::CompleteSuccess | EngineState::CompleteError => &[],
        }
    }

    pub fn can_transition_to(self, next: EngineState) -> bool {
        self.successors().contains(&next)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EngineState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Lifecycle phase of the currently active step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    Inactive,
    Enter,
    Execute,
    Advance,
    Exit,
    Jump,
}

impl StepState {
    pub const ALL: [StepState; 6] = [
        StepState::Inactive,
        StepState::Enter,
        StepState::Execute,
        StepState::Advance,
        StepState::Exit,
        StepState::Jump,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Inactive => "INACTIVE",
            StepState::Enter => "ENTER",
            StepState::Execute => "EXECUTE",
            StepState::Advance => "ADVANCE",
            StepState::Exit => "EXIT",
            StepState::Jump => "JUMP",
        }
    }

    /// `INACTIVE` doubles as the idle state between two steps.
    pub fn is_idle(self) -> bool {
        self == StepState::Inactive
    }

    pub fn successors(self) -> &'static [StepState] {
        match self {
            StepState::Inactive => &[StepState::Enter],
            StepState::Enter => &[StepState::Execute],
            StepState::Execute => &[StepState::Exit, StepState::Jump],
            StepState::Exit => &[StepState::Advance],
            StepState::Advance | StepState::Jump => &[StepState::Inactive, StepState::Enter],
        }
    }

    pub fn can_transition_to(self, next: StepState) -> bool {
        self.successors().contains(&next)
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lifecycle state '{0}'")]
pub struct UnknownState(pub String);

/// Compiled-in defaults for the reserved `global_parameters` group.
pub fn engine_defaults(library_path: &str, instance_path: &str) -> ParameterDocument {
    use keys::*;

    ParameterDocument::new()
        .with(GLOBAL_PARAMETERS, STEP_ENGINE_LIBRARY_PATH, library_path)
        .with(GLOBAL_PARAMETERS, STEP_ENGINE_INSTANCE_PATH, instance_path)
        .with(GLOBAL_PARAMETERS, STEP_ENGINE_STATE, EngineState::Inactive.as_str())
        .with(GLOBAL_PARAMETERS, CURRENT_STEP_MODULE, "")
        .with(GLOBAL_PARAMETERS, CURRENT_STEP_NODE, "")
        .with(GLOBAL_PARAMETERS, CURRENT_STEP_STATE, StepState::Inactive.as_str())
        .with(GLOBAL_PARAMETERS, FIRST_STEP_MODULE, "")
        .with(GLOBAL_PARAMETERS, FIRST_STEP_NODE, "")
        .with(GLOBAL_PARAMETERS, RUN_STEP_COUNT, 0)
}

/// Identity of a step: the module that implements it and the graph node it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef {
    pub module: String,
    pub node: String,
}

/// Typed view of the reserved fields, as an orchestrator reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub engine_state: EngineState,
    pub step_state: StepState,
    pub current_step: Option<StepRef>,
    pub first_step: Option<StepRef>,
    pub run_step_count: i64,
}

impl EngineStatus {
    /// Absent fields read as their defaults; present fields with an unknown
    /// state name are an error.
    pub fn from_document(doc: &ParameterDocument) -> Result<Self, StoreError> {
        use keys::*;

        let engine_state = match doc.get(GLOBAL_PARAMETERS, STEP_ENGINE_STATE) {
            Some(v) => parse_state(STEP_ENGINE_STATE, v)?,
            None => EngineState::Inactive,
        };
        let step_state = match doc.get(GLOBAL_PARAMETERS, CURRENT_STEP_STATE) {
            Some(v) => parse_state(CURRENT_STEP_STATE, v)?,
            None => StepState::Inactive,
        };
        let run_step_count = match doc.get(GLOBAL_PARAMETERS, RUN_STEP_COUNT) {
            Some(v) => v.as_i64().ok_or_else(|| StoreError::InvalidLifecycleValue {
                key: RUN_STEP_COUNT.to_string(),
                value: v.clone(),
            })?,
            None => 0,
        };

        Ok(Self {
            engine_state,
            step_state,
            current_step: step_ref(doc, CURRENT_STEP_MODULE, CURRENT_STEP_NODE),
            first_step: step_ref(doc, FIRST_STEP_MODULE, FIRST_STEP_NODE),
            run_step_count,
        })
    }
}

fn parse_state<T: FromStr>(key: &str, value: &Value) -> Result<T, StoreError> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::InvalidLifecycleValue {
            key: key.to_string(),
            value: value.clone(),
        })
}

fn step_ref(doc: &ParameterDocument, module_key: &str, node_key: &str) -> Option<StepRef> {
    let field = |key: &str| {
        doc.get(keys::GLOBAL_PARAMETERS, key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let module = field(module_key)?;
    Some(StepRef {
        module,
        node: field(node_key).unwrap_or_default(),
    })
}

impl Mutation {
    pub fn engine_state(state: EngineState) -> Self {
        Mutation::set(keys::GLOBAL_PARAMETERS, keys::STEP_ENGINE_STATE, state.as_str())
    }

    pub fn step_state(state: StepState) -> Self {
        Mutation::set(keys::GLOBAL_PARAMETERS, keys::CURRENT_STEP_STATE, state.as_str())
    }

    /// Two writes: module first, then node.
    pub fn current_step(step: &StepRef) -> [Self; 2] {
        [
            Mutation::set(keys::GLOBAL_PARAMETERS, keys::CURRENT_STEP_MODULE, step.module.as_str()),
            Mutation::set(keys::GLOBAL_PARAMETERS, keys::CURRENT_STEP_NODE, step.node.as_str()),
        ]
    }
}
