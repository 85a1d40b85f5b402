//! File-backed storage for workflow and activity execution state.
//!
//! Each workflow execution lives in one pretty-printed JSON document named
//! `{workflow_name}_{workflow_id}.json`, holding the workflow's arguments, result,
//! auxiliary data and the records of every activity it invoked.

pub mod config;
pub mod error;
pub mod storage;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use storage::json_store::JsonFileStore;
pub use storage::memory_store::MemoryStore;
pub use storage::types::{
    ActivityInvocation, ActivityRecord, Payload, WorkflowKey, WorkflowRecord, WorkflowState,
};
pub use storage::{ActivityStorage, ActivityStorageExt, WorkflowStorage, WorkflowStorageExt};
