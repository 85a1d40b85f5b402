use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::storage::types::*;
use crate::storage::{ActivityStorage, WorkflowStorage};

/// In-memory store with the same merge rules as [`JsonFileStore`](super::json_store::JsonFileStore).
/// Holds records only for the lifetime of the store instance.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<WorkflowKey, WorkflowRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the full record for a key, if one was written.
    pub async fn record(&self, workflow_name: &str, workflow_id: &str) -> Option<WorkflowRecord> {
        let records = self.records.lock().await;
        records
            .get(&WorkflowKey::new(workflow_name, workflow_id))
            .cloned()
    }

    async fn update<F>(&self, key: WorkflowKey, apply: F) -> Result<()>
    where
        F: FnOnce(&mut WorkflowRecord) + Send,
    {
        key.validate()?;
        let mut records = self.records.lock().await;
        let record = records
            .entry(key)
            .or_insert_with_key(WorkflowRecord::new);
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl WorkflowStorage for MemoryStore {
    async fn find_incomplete_workflow_ids(&self) -> Result<Vec<String>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|(_, record)| !record.is_complete())
            .map(|(key, _)| key.workflow_id.clone())
            .collect())
    }

    async fn read_workflow(
        &self,
        workflow_name: &str,
        workflow_id: &str,
    ) -> Option<WorkflowState> {
        let records = self.records.lock().await;
        records
            .get(&WorkflowKey::new(workflow_name, workflow_id))
            .map(WorkflowRecord::state)
    }

    async fn write_workflow(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        args: Payload,
        result: Option<Payload>,
    ) -> Result<()> {
        self.update(WorkflowKey::new(workflow_name, workflow_id), |record| {
            record.set_state(args, result)
        })
        .await
    }

    async fn read_workflow_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
    ) -> Option<Payload> {
        let records = self.records.lock().await;
        records
            .get(&WorkflowKey::new(workflow_name, workflow_id))?
            .additional_data()
    }

    async fn write_workflow_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        additional_data: Payload,
    ) -> Result<()> {
        self.update(WorkflowKey::new(workflow_name, workflow_id), |record| {
            record.set_additional_data(additional_data)
        })
        .await
    }
}

#[async_trait]
impl ActivityStorage for MemoryStore {
    async fn read_activity(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
    ) -> Option<ActivityRecord> {
        let records = self.records.lock().await;
        records
            .get(&WorkflowKey::new(workflow_name, workflow_id))?
            .activity(activity_id)
            .cloned()
    }

    async fn write_activity(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
        invocation: ActivityInvocation,
        result: Option<Payload>,
    ) -> Result<()> {
        self.update(WorkflowKey::new(workflow_name, workflow_id), |record| {
            record.upsert_activity(activity_id, invocation, result)
        })
        .await
    }

    async fn read_activity_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
    ) -> Option<Payload> {
        let records = self.records.lock().await;
        records
            .get(&WorkflowKey::new(workflow_name, workflow_id))?
            .activity_additional_data(activity_id)
    }

    async fn write_activity_additional_data(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
        invocation: ActivityInvocation,
        additional_data: Payload,
    ) -> Result<()> {
        self.update(WorkflowKey::new(workflow_name, workflow_id), |record| {
            record.set_activity_additional_data(activity_id, invocation, additional_data)
        })
        .await
    }
}
