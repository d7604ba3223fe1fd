//! Routes named operations to the config store and approval workflow.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use shared_types::{ChangeOperation, ConfigItem, Page, Visibility};
use std::time::Duration;
use tracing::debug;

use super::approval::{ApprovalWorkflow, ChangeProposal};
use super::deadline;
use super::dialect::EntryWrite;
use super::error::{Result, StoreError};
use super::traits::Connector;
use super::translator::OperationArgs;

/// A raw verb against the connected backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericOperation {
    pub operation: String,
    #[serde(flatten)]
    pub args: OperationArgs,
}

/// A config or governance operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOperation {
    pub operation: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    /// Key/value pairs to set, overwriting existing keys
    #[serde(default)]
    pub configs: Map<String, Value>,
    #[serde(default)]
    pub config_items: Vec<ConfigItem>,
    #[serde(default)]
    pub search_term: Option<String>,
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub maker_id: Option<String>,
    #[serde(default)]
    pub checker_id: Option<String>,
    #[serde(default, alias = "comment")]
    pub approval_comment: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub previous_value: Option<Value>,
}

impl ConfigOperation {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }

    fn key(&self) -> Result<&str> {
        self.key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "config key is required for {} operation",
                    self.operation
                ))
            })
    }

    fn non_empty<'s>(&self, field: &'s Option<String>, name: &str) -> Result<&'s str> {
        field
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "{name} is required for {} operation",
                    self.operation
                ))
            })
    }

    fn entry_write(&self) -> Result<EntryWrite> {
        Ok(EntryWrite::new(self.key()?, self.value.clone().unwrap_or(Value::Null))
            .description(self.description.clone())
            .maker(self.maker_id.clone()))
    }

    fn proposal(&self, operation: ChangeOperation) -> Result<ChangeProposal> {
        Ok(ChangeProposal {
            operation,
            key: self.key()?.to_string(),
            value: match operation {
                ChangeOperation::Delete => None,
                _ => self.value.clone(),
            },
            description: self.description.clone(),
            maker_id: self.non_empty(&self.maker_id, "maker_id")?.to_string(),
            previous_value: self.previous_value.clone(),
        })
    }

    fn config_map_items(&self) -> Vec<ConfigItem> {
        self.configs
            .iter()
            .map(|(key, value)| ConfigItem::new(key.clone(), value.clone()))
            .collect()
    }
}

/// Operations that only read
const READ_OPERATIONS: [&str; 19] = [
    "read",
    "get_config",
    "read_admin",
    "read_all",
    "get_all",
    "read_all_admin",
    "search",
    "search_admin",
    "filter",
    "filter_admin",
    "count",
    "count_admin",
    "exists",
    "exists_admin",
    "get_pending_approvals",
    "get_my_requests",
    "get_approval_history",
    "get_request",
    "find",
];

/// Deadline for a named operation
pub fn deadline_for(operation: &str) -> Duration {
    if READ_OPERATIONS.contains(&operation)
        || matches!(operation, "select" | "query" | "findOne" | "count" | "listCollections")
    {
        deadline::READ
    } else {
        deadline::WRITE
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::backend("failed to encode result", e))
}

pub async fn run_generic_operation(connector: &dyn Connector, op: &GenericOperation) -> Result<Value> {
    debug!(backend = %connector.kind(), operation = %op.operation, "Executing generic operation");
    let result = connector.execute(&op.operation, &op.args).await?;
    Ok(result.to_json())
}

pub async fn run_config_operation(
    workflow: &ApprovalWorkflow<'_>,
    op: &ConfigOperation,
) -> Result<Value> {
    let store = workflow.store();
    debug!(table = %store.table(), operation = %op.operation, "Executing config operation");

    match op.operation.as_str() {
        "create_table" => {
            let created = store.create_table_if_missing().await?;
            Ok(json!({"table": store.table(), "created": created}))
        }
        "drop_table" => {
            store.drop_tables().await?;
            Ok(json!({"table": store.table(), "dropped": true}))
        }

        "submit_create" | "submit_update" | "submit_delete" => {
            let operation = match op.operation.as_str() {
                "submit_create" => ChangeOperation::Create,
                "submit_update" => ChangeOperation::Update,
                _ => ChangeOperation::Delete,
            };
            let request = workflow.submit(op.proposal(operation)?).await?;
            Ok(json!({
                "request_id": request.request_id,
                "status": "submitted_for_approval",
                "operation": request.operation,
                "config_key": request.config_key,
                "maker_id": request.maker_id,
            }))
        }
        "approve_request" | "reject_request" => {
            let request_id = op.non_empty(&op.request_id, "request_id")?;
            let checker_id = op.non_empty(&op.checker_id, "checker_id")?;
            let comment = op.approval_comment.as_deref();
            let request = if op.operation == "approve_request" {
                workflow.approve(request_id, checker_id, comment).await?
            } else {
                workflow.reject(request_id, checker_id, comment).await?
            };
            to_json(request)
        }
        "get_pending_approvals" => to_json(workflow.list_pending(op.page()).await?),
        "get_my_requests" => {
            let maker_id = op.non_empty(&op.maker_id, "maker_id")?;
            to_json(workflow.list_mine(maker_id, op.page()).await?)
        }
        "get_approval_history" => to_json(workflow.list_history(op.page()).await?),
        "get_request" => {
            let request_id = op.non_empty(&op.request_id, "request_id")?;
            to_json(workflow.get_request(request_id).await?)
        }

        "direct_create" | "create" | "set_config" => to_json(store.create_direct(&op.entry_write()?).await?),
        "direct_create_batch" | "create_batch" | "set_multiple" => {
            let maker_id = op.maker_id.as_deref();
            if !op.config_items.is_empty() {
                to_json(store.create_batch(&op.config_items, maker_id).await)
            } else if !op.configs.is_empty() {
                // A configs map sets each key, existing or not
                to_json(store.update_batch(&op.config_map_items(), maker_id).await)
            } else {
                Err(StoreError::validation(
                    "config_items or configs are required for batch create operation",
                ))
            }
        }
        "direct_update" | "update" => to_json(store.update_direct(&op.entry_write()?).await?),
        "direct_update_batch" | "update_batch" => {
            if op.config_items.is_empty() {
                return Err(StoreError::validation(
                    "config_items are required for batch update operation",
                ));
            }
            to_json(store.update_batch(&op.config_items, op.maker_id.as_deref()).await)
        }
        "direct_delete" | "delete" | "delete_config" => to_json(store.delete_direct(op.key()?).await?),
        "direct_delete_batch" | "delete_batch" => {
            if op.config_items.is_empty() {
                return Err(StoreError::validation(
                    "config_items with keys are required for batch delete operation",
                ));
            }
            let keys: Vec<String> = op.config_items.iter().map(|i| i.key.clone()).collect();
            to_json(store.delete_batch(&keys).await)
        }
        "direct_delete_all" | "delete_all" => to_json(store.delete_all().await?),

        "read" | "get_config" | "read_admin" => {
            let visibility = if op.operation == "read_admin" {
                Visibility::All
            } else {
                Visibility::ApprovedOnly
            };
            to_json(store.read(op.key()?, visibility).await?)
        }
        "read_all" | "get_all" => to_json(store.read_all(Visibility::ApprovedOnly, op.page()).await?),
        "read_all_admin" => to_json(store.read_all(Visibility::All, op.page()).await?),
        "search" | "search_admin" => {
            let term = op.non_empty(&op.search_term, "search_term")?;
            let visibility = if op.operation == "search" {
                Visibility::ApprovedOnly
            } else {
                Visibility::All
            };
            to_json(store.search(term, visibility, op.page()).await?)
        }
        "filter" | "filter_admin" => {
            if op.filter.is_empty() {
                return Err(StoreError::validation(
                    "filter criteria is required for filter operation",
                ));
            }
            let visibility = if op.operation == "filter" {
                Visibility::ApprovedOnly
            } else {
                Visibility::All
            };
            to_json(store.filter(&op.filter, visibility, op.page()).await?)
        }
        "count" => Ok(json!({"count": store.count(Visibility::ApprovedOnly).await?})),
        "count_admin" => Ok(json!({"count": store.count(Visibility::All).await?})),
        "exists" | "exists_admin" => {
            let key = op.key()?;
            let visibility = if op.operation == "exists" {
                Visibility::ApprovedOnly
            } else {
                Visibility::All
            };
            Ok(json!({"exists": store.exists(key, visibility).await?, "key": key}))
        }

        other => Err(StoreError::unsupported(other, "config operations")),
    }
}
