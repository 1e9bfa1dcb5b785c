//! File-backed parameter store shared by the processes of a step engine.
//!
//! One JSON document per engine instance, guarded by an advisory lock on a
//! sidecar file and replaced atomically on every write. See
//! [`storage::json_store::JsonParameterStore`] for the entry point.

pub mod cli;
pub mod engine;
pub mod storage;

pub use engine::lifecycle::{EngineState, EngineStatus, StepState, engine_defaults, keys};
pub use engine::types::{CounterOp, Group, Mutation, ParameterDocument};
pub use storage::json_store::JsonParameterStore;
pub use storage::{ParameterRepository, StoreConfig, StoreError};
