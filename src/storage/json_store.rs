use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::storage::types::*;
use crate::storage::{ActivityStorage, WorkflowStorage};

/// Suffix of in-flight writes; the scan leaves these alone.
const TMP_SUFFIX: &str = ".json.tmp";

/// File-based JSON store. Each workflow execution is stored as a separate JSON file
/// named `{workflow_name}_{workflow_id}.json` under the base directory.
pub struct JsonFileStore {
    base_dir: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `base_dir`, creating the directory if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|source| StoreError::CreateDir {
            path: base_dir.clone(),
            source,
        })?;
        debug!(dir = %base_dir.display(), "Opened workflow store");

        Ok(Self {
            base_dir,
            lock: RwLock::new(()),
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::new(config.storage_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn workflow_path(&self, key: &WorkflowKey) -> PathBuf {
        self.base_dir.join(key.file_name())
    }

    /// Load a record. Missing, unreadable and malformed files all read as `None`.
    async fn read_record(&self, key: &WorkflowKey) -> Option<WorkflowRecord> {
        key.validate().ok()?;
        let path = self.workflow_path(key);

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(file = %path.display(), error = %e, "Failed to read workflow file");
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(file = %path.display(), error = %e, "Failed to parse workflow file");
                None
            }
        }
    }

    /// Write through a uniquely named temp file renamed over the target, so concurrent
    /// writers never share a temp file and readers never see a partial document.
    async fn write_record(&self, key: &WorkflowKey, record: &WorkflowRecord) -> Result<()> {
        let path = self.workflow_path(key);
        let data = serde_json::to_string_pretty(record)?;

        let base_dir = self.base_dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".")
                .suffix(TMP_SUFFIX)
                .tempfile_in(&base_dir)?;
            tmp.write_all(data.as_bytes())?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|written| written)
        .map_err(|source| StoreError::Write { path, source })
    }

    /// Read-merge-write cycle shared by every write operation.
    async fn update<F>(&self, key: WorkflowKey, apply: F) -> Result<()>
    where
        F: FnOnce(&mut WorkflowRecord) + Send,
    {
        key.validate()?;
        let _lock = self.lock.write().await;

        let mut record = match self.read_record(&key).await {
            Some(record) => record,
            None => WorkflowRecord::new(&key),
        };
        record.stamp(&key);
        apply(&mut record);

        self.write_record(&key, &record).await
    }

    /// Keys of every stored workflow without a result.
    ///
    /// Every file in the directory is considered except in-flight temp files. Those that
    /// cannot be read or parsed are logged and skipped.
    pub async fn incomplete_workflows(&self) -> Result<Vec<WorkflowKey>> {
        let _lock = self.lock.read().await;

        let list_err = |source: std::io::Error| StoreError::ListDir {
            path: self.base_dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.base_dir).await.map_err(list_err)?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
            let path = entry.path();
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(TMP_SUFFIX))
            {
                continue;
            }

            let record = match tokio::fs::read_to_string(&path).await {
                Ok(data) => {
                    serde_json::from_str::<WorkflowRecord>(&data).map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };
            let record = match record {
                Ok(record) => record,
                Err(error) => {
                    warn!(file = %path.display(), error = %error, "Skipping unreadable workflow file");
                    continue;
                }
            };

            if record.is_complete() {
                continue;
            }
            let fallback = entry
                .file_name()
                .to_str()
                .and_then(WorkflowKey::from_file_name);
            if let Some(key) = record.key_or(fallback) {
                keys.push(key);
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl WorkflowStorage for JsonFileStore {
    async fn find_incomplete_workflow_ids(&self) -> Result<Vec<String>> {
        let keys = self.incomplete_workflows().await?;
        Ok(keys.into_iter().map(|key| key.workflow_id).collect())
    }

    async fn read_workflow(
        &self,
        workflow_name: &str,
        workflow_id: &str,
    ) -> Option<WorkflowState> {
        let _lock = self.lock.read().await;
        let record = self
            .read_record(&WorkflowKey::new(workflow_name, workflow_id))
            .await?;
        Some(record.state())
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
        let _lock = self.lock.read().await;
        let record = self
            .read_record(&WorkflowKey::new(workflow_name, workflow_id))
            .await?;
        record.additional_data()
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
impl ActivityStorage for JsonFileStore {
    async fn read_activity(
        &self,
        workflow_name: &str,
        workflow_id: &str,
        activity_id: &str,
    ) -> Option<ActivityRecord> {
        let _lock = self.lock.read().await;
        let mut record = self
            .read_record(&WorkflowKey::new(workflow_name, workflow_id))
            .await?;
        record.activities.remove(activity_id)
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
        let _lock = self.lock.read().await;
        let record = self
            .read_record(&WorkflowKey::new(workflow_name, workflow_id))
            .await?;
        record.activity_additional_data(activity_id)
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
