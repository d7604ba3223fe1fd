use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{Result, StoreError};

/// One normalized row or document
pub type Row = Map<String, Value>;

/// Write acknowledgement, unified across relational and document drivers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteAck {
    /// Rows (or documents) touched by the write
    pub rows_affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub inserted_ids: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Value>,
}

impl WriteAck {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }
}

/// Uniform shape of every backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum QueryResult {
    Rows(Vec<Row>),
    Document(Row),
    Count(u64),
    Ack(WriteAck),
    /// A single-item lookup matched nothing
    Empty,
}

impl QueryResult {
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            Self::Document(doc) => vec![doc],
            Self::Count(_) | Self::Ack(_) | Self::Empty => Vec::new(),
        }
    }

    /// First row of a result, `None` when nothing matched
    pub fn into_first(self) -> Option<Row> {
        match self {
            Self::Rows(rows) => rows.into_iter().next(),
            Self::Document(doc) => Some(doc),
            Self::Count(_) | Self::Ack(_) | Self::Empty => None,
        }
    }

    /// Reads a count, either native or from a single `count` column
    pub fn into_count(self) -> Result<u64> {
        match self {
            Self::Count(n) => Ok(n),
            Self::Rows(rows) => {
                let row = rows.into_iter().next().unwrap_or_default();
                let value = row
                    .get("count")
                    .or_else(|| row.values().next())
                    .cloned()
                    .unwrap_or(Value::from(0));
                value
                    .as_u64()
                    .or_else(|| value.as_i64().and_then(|n| u64::try_from(n).ok()))
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                    .ok_or_else(|| {
                        StoreError::backend("failed to read count", format!("unexpected count value: {value}"))
                    })
            }
            Self::Empty => Ok(0),
            other => Err(StoreError::backend(
                "failed to read count",
                format!("unexpected result shape: {}", other.kind()),
            )),
        }
    }

    pub fn into_ack(self) -> WriteAck {
        match self {
            Self::Ack(ack) => ack,
            _ => WriteAck::default(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rows(_) => "rows",
            Self::Document(_) => "document",
            Self::Count(_) => "count",
            Self::Ack(_) => "ack",
            Self::Empty => "empty",
        }
    }

    /// JSON view used by the operation contract
    pub fn to_json(&self) -> Value {
        match self {
            Self::Rows(rows) => Value::Array(rows.iter().cloned().map(Value::Object).collect()),
            Self::Document(doc) => Value::Object(doc.clone()),
            Self::Count(n) => Value::from(*n),
            Self::Ack(ack) => serde_json::to_value(ack).unwrap_or(Value::Null),
            Self::Empty => Value::Null,
        }
    }
}
