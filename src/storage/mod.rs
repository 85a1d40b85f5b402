pub mod json_store;
pub mod memory_store;
pub mod types;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};
use types::{ActivityInvocation, ActivityRecord, Payload, WorkflowState};

/// Workflow half of the storage contract consumed by the orchestration engine.
#[async_trait]
pub trait WorkflowStorage: Send + Sync {
    /// Ids of every stored workflow that has no result yet.
    async fn find_incomplete_workflow_ids(&self) -> Result<Vec<String>>;

    /// Args and result of a workflow, or `None` if it was never written.
    async fn read_workflow(&self, workflow_name: &str, workflow_id: &str)
    -> Option<WorkflowState>;

    /// Set args and result, creating the workflow if needed.
    async fn write_workflow(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        args: Payload,
        result: Option<Payload>,
    ) -> Result<()>;

    async fn read_workflow_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
    ) -> Option<Payload>;

    async fn write_workflow_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        additional_data: Payload,
    ) -> Result<()>;
}

/// Activity half of the storage contract.
#[async_trait]
pub trait ActivityStorage: Send + Sync {
    async fn read_activity(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
    ) -> Option<ActivityRecord>;

    /// Record an activity call and its result. Existing additional data is kept.
    async fn write_activity(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
        invocation: ActivityInvocation,
        result: Option<Payload>,
    ) -> Result<()>;

    async fn read_activity_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
    ) -> Option<Payload>;

    /// Attach additional data to an activity, creating it from `invocation` if unknown.
    async fn write_activity_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
        invocation: ActivityInvocation,
        additional_data: Payload,
    ) -> Result<()>;
}

fn decode<T: DeserializeOwned>(value: Payload) -> Result<T> {
    serde_json::from_value(value).map_err(StoreError::Payload)
}

/// Return transforms and typed reads layered over [`WorkflowStorage`].
#[async_trait]
pub trait WorkflowStorageExt: WorkflowStorage {
    /// Read a workflow and hand it through `f` before returning it.
    async fn read_workflow_with<F, R>(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        f: F,
    ) -> Option<R>
    where
        F: FnOnce(WorkflowState) -> R + Send,
        R: Send,
    {
        self.read_workflow(workflow_name, workflow_id).await.map(f)
    }

    /// Read a workflow, decoding args and result into caller types.
    async fn read_workflow_as<A, R>(
        &self,
        workflow_name: &str,
        workflow_id: &str,
    ) -> Result<Option<(A, Option<R>)>>
    where
        A: DeserializeOwned + Send,
        R: DeserializeOwned + Send,
    {
        let Some(state) = self.read_workflow(workflow_name, workflow_id).await else {
            return Ok(None);
        };
        let args = decode(state.args)?;
        let result = state.result.map(decode).transpose()?;
        Ok(Some((args, result)))
    }

    async fn read_workflow_additional_data_with<F, R>(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        f: F,
    ) -> Option<R>
    where
        F: FnOnce(Payload) -> R + Send,
        R: Send,
    {
        self.read_workflow_additional_data(workflow_name, workflow_id)
            .await
            .map(f)
    }

    async fn read_workflow_additional_data_as<T>(
        &self,
        workflow_name: &str,
        workflow_id: &str,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.read_workflow_additional_data(workflow_name, workflow_id)
            .await
            .map(decode)
            .transpose()
    }
}

impl<S: WorkflowStorage + ?Sized> WorkflowStorageExt for S {}

/// Return transforms and typed reads layered over [`ActivityStorage`].
#[async_trait]
pub trait ActivityStorageExt: ActivityStorage {
    async fn read_activity_with<F, R>(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
        f: F,
    ) -> Option<R>
    where
        F: FnOnce(ActivityRecord) -> R + Send,
        R: Send,
    {
        self.read_activity(workflow_name, workflow_id, activity_id)
            .await
            .map(f)
    }

    async fn read_activity_additional_data_with<F, R>(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
        f: F,
    ) -> Option<R>
    where
        F: FnOnce(Payload) -> R + Send,
        R: Send,
    {
        self.read_activity_additional_data(workflow_name, workflow_id, activity_id)
            .await
            .map(f)
    }

    async fn read_activity_additional_data_as<T>(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.read_activity_additional_data(workflow_name, workflow_id, activity_id)
            .await
            .map(decode)
            .transpose()
    }
}

impl<S: ActivityStorage + ?Sized> ActivityStorageExt for S {}
