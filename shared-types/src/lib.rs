use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Error returned when a status or operation label is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownLabel {}

/// Visibility state of a stored configuration entry.
///
/// Entries written before the approval workflow existed carry no status and
/// are treated as approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Approved,
    Pending,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of an approval request. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownLabel {
                kind: "request status",
                value: other.to_string(),
            }),
        }
    }
}

/// The kind of change an approval request proposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(UnknownLabel {
                kind: "change operation",
                value: other.to_string(),
            }),
        }
    }
}

/// Treats an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A named configuration value as stored by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(rename = "config_key")]
    pub key: String,
    #[serde(rename = "config_value", default)]
    pub value: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: EntryStatus,
    #[serde(default)]
    pub maker_id: Option<String>,
    #[serde(default)]
    pub checker_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approval_comment: Option<String>,
}

/// Audit record of a proposed change and its resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub config_key: String,
    /// Proposed value; absent for deletions
    #[serde(default)]
    pub config_value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    pub operation: ChangeOperation,
    pub maker_id: String,
    #[serde(default)]
    pub checker_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approval_comment: Option<String>,
    /// Value in force when the request was submitted
    #[serde(default)]
    pub previous_value: Option<Value>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// One item of a batch create/update/delete call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub maker_id: Option<String>,
}

impl ConfigItem {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            description: None,
            maker_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Which entries a read may see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only entries whose status is `approved` (end-user reads)
    #[default]
    ApprovedOnly,
    /// Every entry regardless of status (admin reads)
    All,
}

/// Pagination window. A zero limit means "no limit", matching the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Page {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self {
            limit: limit.filter(|l| *l > 0),
            offset: offset.filter(|o| *o > 0),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }
}

/// Result of a single batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ItemOutcome {
    Success { result: Value },
    Failure { error: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub key: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Summary of a fire-and-continue batch; `results` keeps input order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<BatchItemResult>,
}

impl BatchSummary {
    pub fn record(&mut self, key: impl Into<String>, outcome: ItemOutcome) {
        self.total_items += 1;
        if outcome.is_success() {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.results.push(BatchItemResult {
            key: key.into(),
            outcome,
        });
    }

    pub fn outcome_for(&self, key: &str) -> Option<&ItemOutcome> {
        self.results
            .iter()
            .find(|r| r.key == key)
            .map(|r| &r.outcome)
    }
}
