//! Maps an abstract verb plus generic parameters onto the call shape a
//! backend understands natively.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::BackendKind;
use super::error::{Result, StoreError};
use super::result::Row;

/// Generic operation arguments as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationArgs {
    /// Statement text, relational backends only
    #[serde(default)]
    pub query: Option<String>,
    /// Ordered statement arguments, relational backends only
    #[serde(default)]
    pub args: Vec<Value>,
    /// Structured parameters, document backend only
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl OperationArgs {
    pub fn sql(query: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            query: Some(query.into()),
            args,
            params: Map::new(),
        }
    }

    pub fn document(params: Map<String, Value>) -> Self {
        Self {
            query: None,
            args: Vec::new(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlMode {
    /// Returns rows
    Fetch,
    /// Returns an acknowledgement
    Execute,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub args: Vec<Value>,
    pub mode: SqlMode,
}

impl SqlStatement {
    pub fn fetch(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
            mode: SqlMode::Fetch,
        }
    }

    pub fn execute(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
            mode: SqlMode::Execute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentOp {
    Find,
    FindOne,
    Insert,
    InsertMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    Count,
    ListCollections,
    CreateIndex,
    Drop,
}

impl DocumentOp {
    pub fn from_verb(verb: &str) -> Option<Self> {
        let op = match verb {
            "find" => Self::Find,
            "findOne" => Self::FindOne,
            "insert" => Self::Insert,
            "insertMany" => Self::InsertMany,
            "update" => Self::Update,
            "updateMany" => Self::UpdateMany,
            "upsert" => Self::Upsert,
            "delete" => Self::Delete,
            "deleteMany" => Self::DeleteMany,
            "count" => Self::Count,
            "listCollections" => Self::ListCollections,
            "createIndex" => Self::CreateIndex,
            "drop" => Self::Drop,
            _ => return None,
        };
        Some(op)
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::FindOne => "findOne",
            Self::Insert => "insert",
            Self::InsertMany => "insertMany",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
            Self::Count => "count",
            Self::ListCollections => "listCollections",
            Self::CreateIndex => "createIndex",
            Self::Drop => "drop",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Row,
    pub unique: bool,
}

/// A structured collection operation
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentCommand {
    pub op: DocumentOp,
    pub collection: Option<String>,
    /// Overrides the connected database for this call
    pub database: Option<String>,
    pub filter: Row,
    pub document: Option<Row>,
    pub documents: Vec<Row>,
    pub update: Option<Row>,
    /// Field to direction (`1` or `-1`)
    pub sort: Option<Row>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub index: Option<IndexSpec>,
}

impl DocumentCommand {
    pub fn new(op: DocumentOp, collection: impl Into<String>) -> Self {
        Self {
            op,
            collection: Some(collection.into()),
            database: None,
            filter: Row::new(),
            document: None,
            documents: Vec::new(),
            update: None,
            sort: None,
            limit: None,
            skip: None,
            index: None,
        }
    }

    pub fn list_collections(database: Option<String>, filter: Row) -> Self {
        Self {
            collection: None,
            database,
            filter,
            ..Self::new(DocumentOp::ListCollections, String::new())
        }
    }

    pub fn filter(mut self, filter: Row) -> Self {
        self.filter = filter;
        self
    }

    pub fn document(mut self, document: Row) -> Self {
        self.document = Some(document);
        self
    }

    pub fn update(mut self, update: Row) -> Self {
        self.update = Some(update);
        self
    }

    pub fn sort_by(mut self, field: &str, direction: i64) -> Self {
        let mut sort = Row::new();
        sort.insert(field.to_string(), Value::from(direction));
        self.sort = Some(sort);
        self
    }

    /// Values past `i64::MAX` are clamped
    pub fn page(mut self, limit: Option<u64>, skip: Option<u64>) -> Self {
        self.limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        self.skip = skip.map(|s| i64::try_from(s).unwrap_or(i64::MAX));
        self
    }

    pub fn index(mut self, field: &str, unique: bool) -> Self {
        let mut keys = Row::new();
        keys.insert(field.to_string(), Value::from(1));
        self.index = Some(IndexSpec { keys, unique });
        self
    }
}

/// A call in the backend's native shape
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    Sql(SqlStatement),
    Document(DocumentCommand),
}

/// Placeholder syntax of a relational dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?`
    Positional,
    /// `$1`, `$2`, ...
    Numbered,
}

impl Placeholder {
    pub fn for_backend(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Postgres => Self::Numbered,
            BackendKind::MySql | BackendKind::MongoDb => Self::Positional,
        }
    }

    /// Placeholder for the 1-based argument `index`
    pub fn nth(self, index: usize) -> String {
        match self {
            Self::Positional => "?".to_string(),
            Self::Numbered => format!("${index}"),
        }
    }
}

pub trait Translator: Send + Sync {
    fn backend(&self) -> BackendKind;

    fn translate(&self, verb: &str, args: &OperationArgs) -> Result<NativeCall>;
}

/// Translator for both relational variants
#[derive(Debug, Clone, Copy)]
pub struct SqlTranslator {
    kind: BackendKind,
}

impl SqlTranslator {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }

    pub fn placeholder(&self) -> Placeholder {
        Placeholder::for_backend(self.kind)
    }
}

impl Translator for SqlTranslator {
    fn backend(&self) -> BackendKind {
        self.kind
    }

    fn translate(&self, verb: &str, args: &OperationArgs) -> Result<NativeCall> {
        let mode = match verb {
            "select" | "query" => SqlMode::Fetch,
            "insert" | "update" | "delete" | "execute" => SqlMode::Execute,
            _ => return Err(StoreError::unsupported(verb, self.kind)),
        };
        let query = args
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                StoreError::validation(format!("query parameter required for operation: {verb}"))
            })?;
        Ok(NativeCall::Sql(SqlStatement {
            sql: query.to_string(),
            args: args.args.clone(),
            mode,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTranslator;

impl Translator for DocumentTranslator {
    fn backend(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    fn translate(&self, verb: &str, args: &OperationArgs) -> Result<NativeCall> {
        let op = DocumentOp::from_verb(verb)
            .ok_or_else(|| StoreError::unsupported(verb, BackendKind::MongoDb))?;
        let params = &args.params;

        let collection = optional_string(params, "collection")?;
        if collection.is_none() && op != DocumentOp::ListCollections {
            return Err(StoreError::validation(
                "collection parameter required for document collection operations",
            ));
        }

        let needs_filter = matches!(
            op,
            DocumentOp::Update
                | DocumentOp::UpdateMany
                | DocumentOp::Upsert
                | DocumentOp::Delete
                | DocumentOp::DeleteMany
        );
        if needs_filter && params.get("filter").is_none_or(Value::is_null) {
            return Err(StoreError::validation(format!(
                "filter parameter required for {verb} operation"
            )));
        }

        let mut command = DocumentCommand {
            op,
            collection,
            database: optional_string(params, "database")?,
            filter: optional_object(params, "filter")?.unwrap_or_default(),
            document: optional_object(params, "document")?,
            documents: Vec::new(),
            update: optional_object(params, "update")?,
            sort: optional_object(params, "sort")?
                .map(|sort| normalize_sort(&sort))
                .transpose()?,
            limit: params
                .get("limit")
                .filter(|v| !v.is_null())
                .map(|v| normalize_integer("limit", v))
                .transpose()?,
            skip: params
                .get("skip")
                .filter(|v| !v.is_null())
                .map(|v| normalize_integer("skip", v))
                .transpose()?,
            index: None,
        };

        match op {
            DocumentOp::Insert if command.document.is_none() => {
                return Err(StoreError::validation(
                    "document parameter required for insert operation",
                ));
            }
            DocumentOp::InsertMany => {
                command.documents = required_documents(params)?;
            }
            DocumentOp::Update | DocumentOp::UpdateMany | DocumentOp::Upsert
                if command.update.is_none() =>
            {
                return Err(StoreError::validation(format!(
                    "filter and update parameters required for {verb} operation"
                )));
            }
            DocumentOp::CreateIndex => {
                let keys = optional_object(params, "index")?.ok_or_else(|| {
                    StoreError::validation("index parameter required for createIndex operation")
                })?;
                let unique = optional_object(params, "options")?
                    .and_then(|o| o.get("unique").and_then(Value::as_bool))
                    .unwrap_or(false);
                command.index = Some(IndexSpec { keys, unique });
            }
            _ => {}
        }

        Ok(NativeCall::Document(command))
    }
}

fn optional_string(params: &Map<String, Value>, name: &str) -> Result<Option<String>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(StoreError::validation(format!(
            "{name} must be a string, got {other}"
        ))),
    }
}

fn optional_object(params: &Map<String, Value>, name: &str) -> Result<Option<Row>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(other) => Err(StoreError::validation(format!(
            "{name} must be an object, got {other}"
        ))),
    }
}

fn required_documents(params: &Map<String, Value>) -> Result<Vec<Row>> {
    let Some(Value::Array(items)) = params.get("documents") else {
        return Err(StoreError::validation(
            "documents parameter required for insertMany operation",
        ));
    };
    items
        .iter()
        .map(|item| {
            item.as_object().cloned().ok_or_else(|| {
                StoreError::validation("documents must contain only objects")
            })
        })
        .collect()
}

/// Accepts any JSON integer (signed, unsigned, or integral float) and
/// normalizes it to `i64`.
pub fn normalize_integer(name: &str, value: &Value) -> Result<i64> {
    let normalized = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
            }),
        _ => None,
    };
    match normalized {
        Some(n) if n >= 0 => Ok(n),
        Some(_) => Err(StoreError::validation(format!("{name} must not be negative"))),
        None => Err(StoreError::validation(format!(
            "{name} must be an integer, got {value}"
        ))),
    }
}

fn normalize_sort(sort: &Row) -> Result<Row> {
    sort.iter()
        .map(|(field, direction)| {
            let normalized = match direction {
                Value::Number(n) => match n.as_f64() {
                    Some(d) if d > 0.0 => 1,
                    Some(d) if d < 0.0 => -1,
                    _ => 0,
                },
                Value::String(s) if s.eq_ignore_ascii_case("asc") => 1,
                Value::String(s) if s.eq_ignore_ascii_case("desc") => -1,
                _ => 0,
            };
            if normalized == 0 {
                return Err(StoreError::validation(format!(
                    "invalid sort direction for {field}: {direction}"
                )));
            }
            Ok((field.clone(), Value::from(normalized)))
        })
        .collect()
}
