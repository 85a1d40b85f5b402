use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Opaque framework value stored as-is: arguments, results and additional data.
pub type Payload = serde_json::Value;

fn empty_args() -> Payload {
    Payload::Object(serde_json::Map::new())
}

/// Identity of a stored workflow: the type name plus the execution id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkflowKey {
    pub workflow_name: String,
    pub workflow_id: String,
}

impl WorkflowKey {
    pub fn new(workflow_name: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            workflow_id: workflow_id.into(),
        }
    }

    /// Name of the file holding this workflow: `{workflow_name}_{workflow_id}.json`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.workflow_name, self.workflow_id)
    }

    /// Recover a key from a file name alone.
    ///
    /// The split happens at the last `_` of the stem, so an id that itself contains `_`
    /// comes back truncated. Only used for files that carry no embedded identity.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".json")?;
        let (name, id) = stem.rsplit_once('_').unwrap_or(("", stem));
        Some(Self::new(name, id))
    }

    /// Reject components that would escape the storage directory.
    /// Empty components are allowed: `_{id}.json` stays inside it.
    pub fn validate(&self) -> Result<()> {
        for part in [&self.workflow_name, &self.workflow_id] {
            if part == "." || part == ".." || part.contains(['/', '\\']) {
                return Err(StoreError::InvalidKey(part.clone()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.workflow_name, self.workflow_id)
    }
}

/// The `{args, result}` view of a workflow handed back by `read_workflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub args: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
}

/// The provider/activity/args triple describing one activity call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityInvocation {
    pub provider_name: String,
    pub activity_name: String,
    pub args: Payload,
}

impl ActivityInvocation {
    pub fn new(
        provider_name: impl Into<String>,
        activity_name: impl Into<String>,
        args: Payload,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            activity_name: activity_name.into(),
            args,
        }
    }
}

/// Persisted state of one activity inside a workflow record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub provider_name: String,
    pub activity_name: String,
    pub args: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Payload>,
}

impl ActivityRecord {
    fn from_invocation(invocation: ActivityInvocation) -> Self {
        Self {
            provider_name: invocation.provider_name,
            activity_name: invocation.activity_name,
            args: invocation.args,
            result: None,
            additional_data: None,
        }
    }
}

/// The whole document stored for one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default = "empty_args")]
    pub args: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Payload>,
    #[serde(default)]
    pub activities: BTreeMap<String, ActivityRecord>,
}

impl WorkflowRecord {
    /// Blank record for a key that has never been written.
    pub fn new(key: &WorkflowKey) -> Self {
        Self {
            workflow_name: Some(key.workflow_name.clone()),
            workflow_id: Some(key.workflow_id.clone()),
            args: empty_args(),
            result: None,
            additional_data: None,
            activities: BTreeMap::new(),
        }
    }

    /// Key this record belongs to, preferring the embedded identity over the file name.
    pub fn key_or(&self, fallback: Option<WorkflowKey>) -> Option<WorkflowKey> {
        match (&self.workflow_name, &self.workflow_id) {
            (Some(name), Some(id)) => Some(WorkflowKey::new(name, id)),
            _ => fallback,
        }
    }

    /// Stamp the identity fields; older documents may lack them.
    pub fn stamp(&mut self, key: &WorkflowKey) {
        self.workflow_name = Some(key.workflow_name.clone());
        self.workflow_id = Some(key.workflow_id.clone());
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    pub fn state(&self) -> WorkflowState {
        WorkflowState {
            args: self.args.clone(),
            result: self.result.clone(),
        }
    }

    /// Replace args and result. A `None` or `null` result clears a stored one.
    pub fn set_state(&mut self, args: Payload, result: Option<Payload>) {
        self.args = args;
        self.result = non_null(result);
    }

    pub fn set_additional_data(&mut self, additional_data: Payload) {
        self.additional_data = non_null(Some(additional_data));
    }

    pub fn additional_data(&self) -> Option<Payload> {
        truthy(self.additional_data.as_ref())
    }

    pub fn activity(&self, activity_id: &str) -> Option<&ActivityRecord> {
        self.activities.get(activity_id)
    }

    pub fn activity_additional_data(&self, activity_id: &str) -> Option<Payload> {
        self.activity(activity_id)
            .and_then(|activity| truthy(activity.additional_data.as_ref()))
    }

    /// Create or overwrite an activity's identity, args and result.
    /// Its additional data survives.
    pub fn upsert_activity(
        &mut self,
        activity_id: &str,
        invocation: ActivityInvocation,
        result: Option<Payload>,
    ) {
        let additional_data = self
            .activities
            .remove(activity_id)
            .and_then(|previous| previous.additional_data);

        let mut activity = ActivityRecord::from_invocation(invocation);
        activity.result = non_null(result);
        activity.additional_data = additional_data;
        self.activities.insert(activity_id.to_string(), activity);
    }

    /// Attach additional data to an activity.
    ///
    /// An unknown activity is created from `invocation` without a result; a known one
    /// only has its additional data replaced.
    pub fn set_activity_additional_data(
        &mut self,
        activity_id: &str,
        invocation: ActivityInvocation,
        additional_data: Payload,
    ) {
        self.activities
            .entry(activity_id.to_string())
            .or_insert_with(|| ActivityRecord::from_invocation(invocation))
            .additional_data = non_null(Some(additional_data));
    }
}

/// `null` is stored as an absent field, so it must read back the same way.
fn non_null(value: Option<Payload>) -> Option<Payload> {
    value.filter(|v| !v.is_null())
}

/// Additional data counts as present only when it is not `null`, `false`, `0` or `""`.
fn truthy(value: Option<&Payload>) -> Option<Payload> {
    let value = value?;
    let present = match value {
        Payload::Null => false,
        Payload::Bool(b) => *b,
        Payload::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Payload::String(s) => !s.is_empty(),
        Payload::Array(_) | Payload::Object(_) => true,
    };
    present.then(|| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(args: Payload) -> ActivityInvocation {
        ActivityInvocation::new("payments", "charge", args)
    }

    #[test]
    fn file_name_joins_name_and_id() {
        let key = WorkflowKey::new("orderFlow", "id1");
        assert_eq!(key.file_name(), "orderFlow_id1.json");
    }

    #[test]
    fn from_file_name_splits_at_last_underscore() {
        let key = WorkflowKey::from_file_name("order_flow_id1.json").unwrap();
        assert_eq!(key.workflow_name, "order_flow");
        assert_eq!(key.workflow_id, "id1");

        let bare = WorkflowKey::from_file_name("lonely.json").unwrap();
        assert_eq!(bare.workflow_name, "");
        assert_eq!(bare.workflow_id, "lonely");

        assert!(WorkflowKey::from_file_name("notes.txt").is_none());
    }

    #[test]
    fn validate_rejects_path_components() {
        assert!(WorkflowKey::new("flow", "id").validate().is_ok());
        assert!(WorkflowKey::new("flow", "a_b-c").validate().is_ok());
        assert!(WorkflowKey::new("../etc", "id").validate().is_err());
        assert!(WorkflowKey::new("flow", "x/y").validate().is_err());
        assert!(WorkflowKey::new("flow", "x\\y").validate().is_err());
        assert!(WorkflowKey::new("", "id").validate().is_ok());
        assert_eq!(WorkflowKey::new("", "id").file_name(), "_id.json");
        assert!(WorkflowKey::new("flow", "..").validate().is_err());
    }

    #[test]
    fn new_record_has_empty_args_and_activities() {
        let record = WorkflowRecord::new(&WorkflowKey::new("flow", "1"));
        assert_eq!(record.args, json!({}));
        assert!(record.activities.is_empty());
        assert!(!record.is_complete());
    }

    #[test]
    fn set_state_keeps_additional_data_and_activities() {
        let mut record = WorkflowRecord::new(&WorkflowKey::new("flow", "1"));
        record.set_additional_data(json!({"trace": "abc"}));
        record.upsert_activity("a1", invocation(json!([1])), Some(json!("ok")));

        record.set_state(json!({"qty": 3}), Some(json!({"status": "done"})));

        assert_eq!(record.args, json!({"qty": 3}));
        assert!(record.is_complete());
        assert_eq!(record.additional_data(), Some(json!({"trace": "abc"})));
        assert!(record.activity("a1").is_some());

        record.set_state(json!({"qty": 4}), None);
        assert!(!record.is_complete());
    }

    #[test]
    fn null_results_are_stored_as_absent() {
        let mut record = WorkflowRecord::new(&WorkflowKey::new("flow", "1"));
        record.set_state(json!({}), Some(json!(null)));
        assert!(!record.is_complete());
        assert!(record.state().result.is_none());

        record.upsert_activity("a1", invocation(json!([])), Some(json!(null)));
        assert!(record.activity("a1").unwrap().result.is_none());

        let text = serde_json::to_string(&record).unwrap();
        let reloaded: WorkflowRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(reloaded, record);
    }

    #[test]
    fn upsert_activity_preserves_additional_data() {
        let mut record = WorkflowRecord::new(&WorkflowKey::new("flow", "1"));
        record.set_activity_additional_data("a1", invocation(json!([1])), json!({"attempt": 2}));
        record.upsert_activity(
            "a1",
            ActivityInvocation::new("payments", "refund", json!([9])),
            Some(json!(true)),
        );

        let activity = record.activity("a1").unwrap();
        assert_eq!(activity.activity_name, "refund");
        assert_eq!(activity.args, json!([9]));
        assert_eq!(activity.result, Some(json!(true)));
        assert_eq!(activity.additional_data, Some(json!({"attempt": 2})));
    }

    #[test]
    fn activity_additional_data_only_touches_existing_field() {
        let mut record = WorkflowRecord::new(&WorkflowKey::new("flow", "1"));
        record.upsert_activity("a1", invocation(json!([1])), Some(json!("ok")));
        record.set_activity_additional_data(
            "a1",
            ActivityInvocation::new("other", "ignored", json!("ignored")),
            json!("extra"),
        );

        let activity = record.activity("a1").unwrap();
        assert_eq!(activity.provider_name, "payments");
        assert_eq!(activity.args, json!([1]));
        assert_eq!(activity.result, Some(json!("ok")));
        assert_eq!(activity.additional_data, Some(json!("extra")));
    }

    #[test]
    fn falsy_additional_data_reads_as_absent() {
        let mut record = WorkflowRecord::new(&WorkflowKey::new("flow", "1"));
        for value in [json!(null), json!(false), json!(0), json!("")] {
            record.set_additional_data(value);
            assert_eq!(record.additional_data(), None);
        }
        for value in [json!(true), json!(1), json!("x"), json!([]), json!({})] {
            record.set_additional_data(value.clone());
            assert_eq!(record.additional_data(), Some(value));
        }
    }

    #[test]
    fn serializes_with_camel_case_and_skips_absent_fields() {
        let mut record = WorkflowRecord::new(&WorkflowKey::new("flow", "1"));
        record.set_activity_additional_data("a1", invocation(json!(null)), json!({"k": 1}));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "workflowName": "flow",
                "workflowId": "1",
                "args": {},
                "activities": {
                    "a1": {
                        "providerName": "payments",
                        "activityName": "charge",
                        "args": null,
                        "additionalData": {"k": 1}
                    }
                }
            })
        );
    }

    #[test]
    fn deserializes_documents_without_identity() {
        let record: WorkflowRecord =
            serde_json::from_str(r#"{"args": {"qty": 3}, "result": null, "activities": {}}"#)
                .unwrap();
        assert!(record.workflow_id.is_none());
        assert!(!record.is_complete());

        let fallback = WorkflowKey::from_file_name("orderFlow_id1.json");
        assert_eq!(
            record.key_or(fallback),
            Some(WorkflowKey::new("orderFlow", "id1"))
        );
    }
}
