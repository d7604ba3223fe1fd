//! Maker-checker workflow on top of [`ConfigStore`].
//!
//! A request moves `pending -> approved | rejected` exactly once. The
//! transition is a conditional update on `status = 'pending'`, so of two
//! concurrent resolutions only one wins and the loser writes nothing.
//! Approval claims the request first and then applies the change. A failed
//! apply returns the request to `pending`; if that also fails the request
//! reads `approved` with the entry unchanged.

use chrono::Utc;
use serde_json::Value;
use shared_types::{ApprovalRequest, ChangeOperation, Page, RequestStatus, Visibility};
use tracing::{info, instrument, warn};

use super::dialect::{EntryWrite, RequestSelection};
use super::error::{Result, StoreError};
use super::result::Row;
use super::store::ConfigStore;

/// A change submitted for review
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeProposal {
    pub operation: ChangeOperation,
    pub key: String,
    pub value: Option<Value>,
    pub description: Option<String>,
    pub maker_id: String,
    /// Captured from the current entry when not supplied
    pub previous_value: Option<Value>,
}

impl ChangeProposal {
    pub fn create(key: impl Into<String>, value: impl Into<Value>, maker_id: impl Into<String>) -> Self {
        Self {
            operation: ChangeOperation::Create,
            key: key.into(),
            value: Some(value.into()),
            description: None,
            maker_id: maker_id.into(),
            previous_value: None,
        }
    }

    pub fn update(key: impl Into<String>, value: impl Into<Value>, maker_id: impl Into<String>) -> Self {
        Self {
            operation: ChangeOperation::Update,
            ..Self::create(key, value, maker_id)
        }
    }

    pub fn delete(key: impl Into<String>, maker_id: impl Into<String>) -> Self {
        Self {
            operation: ChangeOperation::Delete,
            key: key.into(),
            value: None,
            description: None,
            maker_id: maker_id.into(),
            previous_value: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 16 random bytes, hex-encoded
pub fn new_request_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn decode_request(row: Row) -> Result<ApprovalRequest> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| StoreError::backend("failed to decode approval request", e))
}

fn require(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(format!("{name} is required")));
    }
    Ok(())
}

pub struct ApprovalWorkflow<'a> {
    store: ConfigStore<'a>,
}

impl<'a> ApprovalWorkflow<'a> {
    pub fn new(store: ConfigStore<'a>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ConfigStore<'a> {
        &self.store
    }

    /// Records a pending request; the config entries are untouched
    #[instrument(skip(self, proposal), fields(key = %proposal.key, operation = %proposal.operation))]
    pub async fn submit(&self, proposal: ChangeProposal) -> Result<ApprovalRequest> {
        require(&proposal.key, "config key")?;
        require(&proposal.maker_id, "maker_id")?;
        if proposal.operation != ChangeOperation::Delete && proposal.value.is_none() {
            return Err(StoreError::validation(format!(
                "value is required for submit_{}",
                proposal.operation
            )));
        }

        let previous_value = match (proposal.previous_value, proposal.operation) {
            (Some(previous), _) => Some(previous),
            (None, ChangeOperation::Create) => None,
            (None, _) => self
                .store
                .read(&proposal.key, Visibility::All)
                .await?
                .map(|entry| entry.value),
        };

        let request = ApprovalRequest {
            request_id: new_request_id(),
            config_key: proposal.key,
            config_value: proposal.value,
            description: proposal.description,
            operation: proposal.operation,
            maker_id: proposal.maker_id,
            checker_id: None,
            status: RequestStatus::Pending,
            requested_at: Utc::now(),
            processed_at: None,
            approval_comment: None,
            previous_value,
        };
        let call = self
            .store
            .dialect()
            .insert_request(self.store.table(), &request);
        self.store.run(call).await?;
        info!(request_id = %request.request_id, maker = %request.maker_id, "Submitted change for approval");
        Ok(request)
    }

    /// Any request, whatever its status
    pub async fn get_request(&self, request_id: &str) -> Result<Option<ApprovalRequest>> {
        require(request_id, "request_id")?;
        let call = self
            .store
            .dialect()
            .find_request(self.store.table(), request_id);
        self.store
            .run(call)
            .await?
            .into_first()
            .map(decode_request)
            .transpose()
    }

    async fn load_pending(&self, request_id: &str, checker_id: &str) -> Result<ApprovalRequest> {
        require(checker_id, "checker_id")?;
        let request = self
            .get_request(request_id)
            .await?
            .filter(ApprovalRequest::is_pending)
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "approval request {request_id} not found or not pending"
                ))
            })?;
        if request.maker_id == checker_id {
            return Err(StoreError::validation(
                "a request cannot be resolved by its own maker",
            ));
        }
        Ok(request)
    }

    async fn transition(
        &self,
        request_id: &str,
        status: RequestStatus,
        checker_id: &str,
        comment: Option<&str>,
    ) -> Result<()> {
        let call = self.store.dialect().resolve_request(
            self.store.table(),
            request_id,
            status,
            checker_id,
            comment,
        );
        let ack = self.store.run(call).await?.into_ack();
        if ack.matched.unwrap_or(ack.rows_affected) == 0 {
            return Err(StoreError::NotFound(format!(
                "approval request {request_id} not found or not pending"
            )));
        }
        Ok(())
    }

    /// Claims the request, then applies its change with the original maker
    #[instrument(skip(self, comment))]
    pub async fn approve(
        &self,
        request_id: &str,
        checker_id: &str,
        comment: Option<&str>,
    ) -> Result<ApprovalRequest> {
        let mut request = self.load_pending(request_id, checker_id).await?;
        self.transition(request_id, RequestStatus::Approved, checker_id, comment)
            .await?;

        if let Err(err) = self.apply(&request, checker_id, comment).await {
            warn!(%request_id, key = %request.config_key, error = %err, "Apply failed, reopening request");
            self.reopen(request_id, checker_id).await;
            return Err(err);
        }

        info!(%request_id, key = %request.config_key, "Approved request");
        request.status = RequestStatus::Approved;
        request.checker_id = Some(checker_id.to_string());
        request.approval_comment = comment.map(str::to_string);
        request.processed_at = Some(Utc::now());
        Ok(request)
    }

    async fn apply(
        &self,
        request: &ApprovalRequest,
        checker_id: &str,
        comment: Option<&str>,
    ) -> Result<()> {
        let write = EntryWrite::new(
            request.config_key.clone(),
            request.config_value.clone().unwrap_or(Value::Null),
        )
        .description(request.description.clone())
        .maker(Some(request.maker_id.clone()))
        .checked_by(checker_id, comment.map(str::to_string));

        match request.operation {
            ChangeOperation::Create => self.store.create_direct(&write).await?,
            ChangeOperation::Update => self.store.update_direct(&write).await?,
            ChangeOperation::Delete => self.store.delete_direct(&request.config_key).await?,
        };
        Ok(())
    }

    async fn reopen(&self, request_id: &str, checker_id: &str) {
        let call = self
            .store
            .dialect()
            .reopen_request(self.store.table(), request_id, checker_id);
        if let Err(err) = self.store.run(call).await {
            warn!(%request_id, error = %err, "Request left approved after a failed apply");
        }
    }

    #[instrument(skip(self, comment))]
    pub async fn reject(
        &self,
        request_id: &str,
        checker_id: &str,
        comment: Option<&str>,
    ) -> Result<ApprovalRequest> {
        let mut request = self.load_pending(request_id, checker_id).await?;
        self.transition(request_id, RequestStatus::Rejected, checker_id, comment)
            .await?;

        info!(%request_id, key = %request.config_key, "Rejected request");
        request.status = RequestStatus::Rejected;
        request.checker_id = Some(checker_id.to_string());
        request.approval_comment = comment.map(str::to_string);
        request.processed_at = Some(Utc::now());
        Ok(request)
    }

    async fn list(&self, selection: RequestSelection<'_>, page: Page) -> Result<Vec<ApprovalRequest>> {
        let call = self
            .store
            .dialect()
            .select_requests(self.store.table(), selection, page);
        self.store
            .run(call)
            .await?
            .into_rows()
            .into_iter()
            .map(decode_request)
            .collect()
    }

    /// Oldest first
    pub async fn list_pending(&self, page: Page) -> Result<Vec<ApprovalRequest>> {
        self.list(RequestSelection::Pending, page).await
    }

    /// Newest first
    pub async fn list_mine(&self, maker_id: &str, page: Page) -> Result<Vec<ApprovalRequest>> {
        require(maker_id, "maker_id")?;
        self.list(RequestSelection::Maker(maker_id), page).await
    }

    /// Approved and rejected requests, most recently processed first
    pub async fn list_history(&self, page: Page) -> Result<Vec<ApprovalRequest>> {
        self.list(RequestSelection::Resolved, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_hex_and_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_proposal_builders() {
        let update = ChangeProposal::update("k", "v", "alice").with_description("d");
        assert_eq!(update.operation, ChangeOperation::Update);
        assert_eq!(update.value, Some(Value::from("v")));
        assert_eq!(update.description.as_deref(), Some("d"));

        let delete = ChangeProposal::delete("k", "alice");
        assert!(delete.value.is_none());
    }
}
