//! Renders the config store's statements for each backend family.
//!
//! Values always travel as bound arguments. Table and column names are
//! interpolated, so callers must pass names that went through
//! [`validate_identifier`] and [`entry_column`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use shared_types::{ApprovalRequest, Page, RequestStatus, Visibility};

use super::config::BackendKind;
use super::error::{Result, StoreError};
use super::result::Row;
use super::translator::{DocumentCommand, DocumentOp, NativeCall, Placeholder, SqlStatement};

pub const ENTRY_COLUMNS: [&str; 10] = [
    "config_key",
    "config_value",
    "description",
    "status",
    "maker_id",
    "checker_id",
    "created_at",
    "updated_at",
    "approved_at",
    "approval_comment",
];

pub const REQUEST_COLUMNS: [&str; 12] = [
    "request_id",
    "config_key",
    "config_value",
    "description",
    "operation",
    "maker_id",
    "checker_id",
    "status",
    "requested_at",
    "processed_at",
    "approval_comment",
    "previous_value",
];

const TIMESTAMP_COLUMNS: [&str; 3] = ["created_at", "updated_at", "approved_at"];

/// Key used by the document bootstrap's throwaway document
pub const SENTINEL_KEY: &str = "_init";

const MYSQL_MAX_LIMIT: &str = "18446744073709551615";

pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || name.len() > 45 {
        return Err(StoreError::validation(format!(
            "invalid table name: {name:?}"
        )));
    }
    Ok(())
}

/// Resolves a caller-facing field name to its storage column
pub fn entry_column(field: &str) -> Result<&'static str> {
    let field = match field {
        "key" => "config_key",
        "value" => "config_value",
        other => other,
    };
    ENTRY_COLUMNS
        .iter()
        .find(|c| **c == field)
        .copied()
        .ok_or_else(|| StoreError::validation(format!("unknown filter field: {field}")))
}

pub fn requests_table(table: &str) -> String {
    format!("{table}_approval_requests")
}

/// Relational columns hold values as text
pub fn value_as_text(value: &Value) -> Value {
    match value {
        Value::Null | Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

/// Fixed-width timestamp so stored strings sort chronologically
pub fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now_text() -> Value {
    Value::String(timestamp_text(Utc::now()))
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Fields of a direct write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryWrite {
    pub key: String,
    pub value: Value,
    pub description: Option<String>,
    pub maker_id: Option<String>,
    pub checker_id: Option<String>,
    pub approval_comment: Option<String>,
}

impl EntryWrite {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn maker(mut self, maker_id: Option<String>) -> Self {
        self.maker_id = maker_id;
        self
    }

    pub fn checked_by(mut self, checker_id: impl Into<String>, comment: Option<String>) -> Self {
        self.checker_id = Some(checker_id.into());
        self.approval_comment = comment;
        self
    }
}

/// Selection over the entries table
#[derive(Debug, Clone, Default)]
pub struct EntryQuery<'a> {
    pub visibility: Visibility,
    pub key: Option<&'a str>,
    pub search: Option<&'a str>,
    /// Resolved column and exact value, conjoined
    pub criteria: Vec<(&'static str, Value)>,
    pub page: Page,
}

impl<'a> EntryQuery<'a> {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            ..Self::default()
        }
    }

    pub fn key(mut self, key: &'a str) -> Self {
        self.key = Some(key);
        self
    }

    pub fn search(mut self, term: &'a str) -> Self {
        self.search = Some(term);
        self
    }

    pub fn criteria(mut self, criteria: Vec<(&'static str, Value)>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSelection<'a> {
    /// Pending, oldest first
    Pending,
    /// One maker's requests, newest first
    Maker(&'a str),
    /// Resolved requests, most recently processed first
    Resolved,
}

/// Accumulates SQL text and its bound arguments
struct SqlBuilder {
    placeholder: Placeholder,
    args: Vec<Value>,
}

impl SqlBuilder {
    fn new(placeholder: Placeholder) -> Self {
        Self {
            placeholder,
            args: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.args.push(value);
        self.placeholder.nth(self.args.len())
    }
}

/// Statement renderer, chosen once per store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sql {
        kind: BackendKind,
        placeholder: Placeholder,
    },
    Document,
}

impl Dialect {
    pub fn for_backend(kind: BackendKind) -> Self {
        if kind.is_relational() {
            Self::Sql {
                kind,
                placeholder: Placeholder::for_backend(kind),
            }
        } else {
            Self::Document
        }
    }

    fn now_sql(kind: BackendKind) -> &'static str {
        match kind {
            BackendKind::MySql => "CURRENT_TIMESTAMP(6)",
            _ => "CURRENT_TIMESTAMP",
        }
    }

    fn paging_sql(kind: BackendKind, page: Page) -> String {
        match (page.limit, page.offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (None, Some(offset)) if kind == BackendKind::MySql => {
                format!(" LIMIT {MYSQL_MAX_LIMIT} OFFSET {offset}")
            }
            (None, Some(offset)) => format!(" OFFSET {offset}"),
            (None, None) => String::new(),
        }
    }

    fn entry_where(kind: BackendKind, b: &mut SqlBuilder, query: &EntryQuery<'_>) -> String {
        let mut conditions = Vec::new();
        if query.visibility == Visibility::ApprovedOnly {
            conditions.push("status = 'approved'".to_string());
        }
        if let Some(key) = query.key {
            conditions.push(format!("config_key = {}", b.bind(Value::from(key))));
        }
        if let Some(term) = query.search {
            let pattern = escape_like(term);
            let matches: Vec<String> = ["config_key", "config_value", "description"]
                .iter()
                .map(|column| {
                    let p = b.bind(Value::String(pattern.clone()));
                    match kind {
                        BackendKind::Postgres => format!("{column} ILIKE {p}"),
                        _ => format!("LOWER({column}) LIKE LOWER({p})"),
                    }
                })
                .collect();
            conditions.push(format!("({})", matches.join(" OR ")));
        }
        for (column, value) in &query.criteria {
            let p = b.bind(value_as_text(value));
            if kind == BackendKind::Postgres && TIMESTAMP_COLUMNS.contains(column) {
                conditions.push(format!("{column}::text = {p}"));
            } else {
                conditions.push(format!("{column} = {p}"));
            }
        }
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }

    fn entry_filter(query: &EntryQuery<'_>) -> Row {
        let mut clauses: Vec<Value> = Vec::new();
        if query.visibility == Visibility::ApprovedOnly {
            clauses.push(json!({"status": "approved"}));
        }
        if let Some(key) = query.key {
            clauses.push(json!({"config_key": key}));
        }
        if let Some(term) = query.search {
            let pattern = regex::escape(term);
            let matches: Vec<Value> = ["config_key", "config_value", "description"]
                .iter()
                .map(|field| json!({ *field: {"$regex": pattern, "$options": "i"} }))
                .collect();
            clauses.push(json!({"$or": matches}));
        }
        for (column, value) in &query.criteria {
            clauses.push(json!({ *column: value }));
        }
        match clauses.len() {
            0 => Row::new(),
            1 => object(clauses.remove(0)),
            _ => object(json!({"$and": clauses})),
        }
    }

    pub fn select_entries(&self, table: &str, query: &EntryQuery<'_>) -> NativeCall {
        match *self {
            Self::Sql { kind, placeholder } => {
                let mut b = SqlBuilder::new(placeholder);
                let filter = Self::entry_where(kind, &mut b, query);
                let sql = format!(
                    "SELECT {} FROM {table}{filter} ORDER BY config_key{}",
                    ENTRY_COLUMNS.join(", "),
                    Self::paging_sql(kind, query.page)
                );
                NativeCall::Sql(SqlStatement::fetch(sql, b.args))
            }
            Self::Document => {
                let op = if query.key.is_some() {
                    DocumentOp::FindOne
                } else {
                    DocumentOp::Find
                };
                NativeCall::Document(
                    DocumentCommand::new(op, table)
                        .filter(Self::entry_filter(query))
                        .sort_by("config_key", 1)
                        .page(query.page.limit, query.page.offset),
                )
            }
        }
    }

    pub fn count_entries(&self, table: &str, query: &EntryQuery<'_>) -> NativeCall {
        match *self {
            Self::Sql { kind, placeholder } => {
                let mut b = SqlBuilder::new(placeholder);
                let filter = Self::entry_where(kind, &mut b, query);
                let sql = format!("SELECT COUNT(*) AS count FROM {table}{filter}");
                NativeCall::Sql(SqlStatement::fetch(sql, b.args))
            }
            Self::Document => NativeCall::Document(
                DocumentCommand::new(DocumentOp::Count, table).filter(Self::entry_filter(query)),
            ),
        }
    }

    fn write_args(b: &mut SqlBuilder, write: &EntryWrite) -> [String; 6] {
        [
            b.bind(Value::from(write.key.as_str())),
            b.bind(value_as_text(&write.value)),
            b.bind(optional_text(write.description.as_deref())),
            b.bind(optional_text(write.maker_id.as_deref())),
            b.bind(optional_text(write.checker_id.as_deref())),
            b.bind(optional_text(write.approval_comment.as_deref())),
        ]
    }

    fn insert_sql(kind: BackendKind, table: &str, params: &[String; 6]) -> String {
        let now = Self::now_sql(kind);
        let [key, value, description, maker, checker, comment] = params;
        format!(
            "INSERT INTO {table} (config_key, config_value, description, status, maker_id, \
             checker_id, approval_comment, created_at, updated_at, approved_at) \
             VALUES ({key}, {value}, {description}, 'approved', {maker}, {checker}, {comment}, \
             {now}, {now}, {now})"
        )
    }

    fn entry_document(write: &EntryWrite) -> Row {
        let now = now_text();
        object(json!({
            "config_key": write.key,
            "config_value": write.value,
            "description": write.description,
            "status": "approved",
            "maker_id": write.maker_id,
            "checker_id": write.checker_id,
            "created_at": now,
            "updated_at": now,
            "approved_at": now,
            "approval_comment": write.approval_comment,
        }))
    }

    /// Plain insert; an existing key surfaces the backend's uniqueness error
    pub fn insert_entry(&self, table: &str, write: &EntryWrite) -> NativeCall {
        match *self {
            Self::Sql { kind, placeholder } => {
                let mut b = SqlBuilder::new(placeholder);
                let params = Self::write_args(&mut b, write);
                let sql = Self::insert_sql(kind, table, &params);
                NativeCall::Sql(SqlStatement::execute(sql, b.args))
            }
            Self::Document => NativeCall::Document(
                DocumentCommand::new(DocumentOp::Insert, table).document(Self::entry_document(write)),
            ),
        }
    }

    /// Insert-or-replace keeping `created_at`. A missing description keeps
    /// the stored one.
    pub fn upsert_entry(&self, table: &str, write: &EntryWrite) -> NativeCall {
        match *self {
            Self::Sql { kind, placeholder } => {
                let mut b = SqlBuilder::new(placeholder);
                let params = Self::write_args(&mut b, write);
                let insert = Self::insert_sql(kind, table, &params);
                let now = Self::now_sql(kind);
                let sql = match kind {
                    BackendKind::MySql => format!(
                        "{insert} ON DUPLICATE KEY UPDATE config_value = VALUES(config_value), \
                         description = COALESCE(VALUES(description), description), \
                         status = 'approved', maker_id = VALUES(maker_id), \
                         checker_id = VALUES(checker_id), \
                         approval_comment = VALUES(approval_comment), \
                         updated_at = {now}, approved_at = {now}"
                    ),
                    _ => format!(
                        "{insert} ON CONFLICT (config_key) DO UPDATE SET \
                         config_value = EXCLUDED.config_value, \
                         description = COALESCE(EXCLUDED.description, {table}.description), \
                         status = 'approved', maker_id = EXCLUDED.maker_id, \
                         checker_id = EXCLUDED.checker_id, \
                         approval_comment = EXCLUDED.approval_comment, \
                         updated_at = {now}, approved_at = {now}"
                    ),
                };
                NativeCall::Sql(SqlStatement::execute(sql, b.args))
            }
            Self::Document => {
                let now = now_text();
                let mut set = object(json!({
                    "config_value": write.value,
                    "status": "approved",
                    "maker_id": write.maker_id,
                    "checker_id": write.checker_id,
                    "approval_comment": write.approval_comment,
                    "updated_at": now,
                    "approved_at": now,
                }));
                if let Some(description) = &write.description {
                    set.insert("description".into(), Value::from(description.as_str()));
                }
                let update = object(json!({
                    "$set": set,
                    "$setOnInsert": {"created_at": now},
                }));
                NativeCall::Document(
                    DocumentCommand::new(DocumentOp::Upsert, table)
                        .filter(object(json!({"config_key": write.key})))
                        .update(update),
                )
            }
        }
    }

    pub fn delete_entry(&self, table: &str, key: &str) -> NativeCall {
        match *self {
            Self::Sql { placeholder, .. } => {
                let mut b = SqlBuilder::new(placeholder);
                let p = b.bind(Value::from(key));
                NativeCall::Sql(SqlStatement::execute(
                    format!("DELETE FROM {table} WHERE config_key = {p}"),
                    b.args,
                ))
            }
            Self::Document => NativeCall::Document(
                DocumentCommand::new(DocumentOp::Delete, table)
                    .filter(object(json!({"config_key": key}))),
            ),
        }
    }

    pub fn delete_all(&self, table: &str) -> NativeCall {
        match *self {
            Self::Sql { .. } => NativeCall::Sql(SqlStatement::execute(
                format!("DELETE FROM {table}"),
                Vec::new(),
            )),
            Self::Document => NativeCall::Document(DocumentCommand::new(DocumentOp::DeleteMany, table)),
        }
    }

    pub fn insert_request(&self, table: &str, request: &ApprovalRequest) -> NativeCall {
        let requests = requests_table(table);
        match *self {
            Self::Sql { kind, placeholder } => {
                let mut b = SqlBuilder::new(placeholder);
                let id = b.bind(Value::from(request.request_id.as_str()));
                let key = b.bind(Value::from(request.config_key.as_str()));
                let value = b.bind(request.config_value.as_ref().map_or(Value::Null, value_as_text));
                let description = b.bind(optional_text(request.description.as_deref()));
                let operation = b.bind(Value::from(request.operation.as_str()));
                let maker = b.bind(Value::from(request.maker_id.as_str()));
                let previous =
                    b.bind(request.previous_value.as_ref().map_or(Value::Null, value_as_text));
                let sql = format!(
                    "INSERT INTO {requests} (request_id, config_key, config_value, description, \
                     operation, maker_id, status, requested_at, previous_value) \
                     VALUES ({id}, {key}, {value}, {description}, {operation}, {maker}, \
                     'pending', {}, {previous})",
                    Self::now_sql(kind)
                );
                NativeCall::Sql(SqlStatement::execute(sql, b.args))
            }
            Self::Document => {
                let document = object(json!({
                    "request_id": request.request_id,
                    "config_key": request.config_key,
                    "config_value": request.config_value,
                    "description": request.description,
                    "operation": request.operation.as_str(),
                    "maker_id": request.maker_id,
                    "checker_id": null,
                    "status": RequestStatus::Pending.as_str(),
                    "requested_at": timestamp_text(request.requested_at),
                    "processed_at": null,
                    "approval_comment": null,
                    "previous_value": request.previous_value,
                }));
                NativeCall::Document(DocumentCommand::new(DocumentOp::Insert, requests).document(document))
            }
        }
    }

    pub fn find_request(&self, table: &str, request_id: &str) -> NativeCall {
        let requests = requests_table(table);
        match *self {
            Self::Sql { placeholder, .. } => {
                let mut b = SqlBuilder::new(placeholder);
                let p = b.bind(Value::from(request_id));
                let sql = format!(
                    "SELECT {} FROM {requests} WHERE request_id = {p}",
                    REQUEST_COLUMNS.join(", ")
                );
                NativeCall::Sql(SqlStatement::fetch(sql, b.args))
            }
            Self::Document => NativeCall::Document(
                DocumentCommand::new(DocumentOp::FindOne, requests)
                    .filter(object(json!({"request_id": request_id}))),
            ),
        }
    }

    pub fn select_requests(
        &self,
        table: &str,
        selection: RequestSelection<'_>,
        page: Page,
    ) -> NativeCall {
        let requests = requests_table(table);
        let (order_column, direction) = match selection {
            RequestSelection::Pending => ("requested_at", 1),
            RequestSelection::Maker(_) => ("requested_at", -1),
            RequestSelection::Resolved => ("processed_at", -1),
        };
        match *self {
            Self::Sql { kind, placeholder } => {
                let mut b = SqlBuilder::new(placeholder);
                let filter = match selection {
                    RequestSelection::Pending => "status = 'pending'".to_string(),
                    RequestSelection::Maker(maker) => {
                        format!("maker_id = {}", b.bind(Value::from(maker)))
                    }
                    RequestSelection::Resolved => {
                        "status IN ('approved', 'rejected')".to_string()
                    }
                };
                let order = if direction > 0 { "ASC" } else { "DESC" };
                let sql = format!(
                    "SELECT {} FROM {requests} WHERE {filter} ORDER BY {order_column} {order}{}",
                    REQUEST_COLUMNS.join(", "),
                    Self::paging_sql(kind, page)
                );
                NativeCall::Sql(SqlStatement::fetch(sql, b.args))
            }
            Self::Document => {
                let filter = match selection {
                    RequestSelection::Pending => json!({"status": "pending"}),
                    RequestSelection::Maker(maker) => json!({"maker_id": maker}),
                    RequestSelection::Resolved => {
                        json!({"status": {"$in": ["approved", "rejected"]}})
                    }
                };
                NativeCall::Document(
                    DocumentCommand::new(DocumentOp::Find, requests)
                        .filter(object(filter))
                        .sort_by(order_column, direction)
                        .page(page.limit, page.offset),
                )
            }
        }
    }

    /// Moves a request out of `pending`; matches nothing once it has left
    pub fn resolve_request(
        &self,
        table: &str,
        request_id: &str,
        status: RequestStatus,
        checker_id: &str,
        comment: Option<&str>,
    ) -> NativeCall {
        let requests = requests_table(table);
        match *self {
            Self::Sql { kind, placeholder } => {
                let mut b = SqlBuilder::new(placeholder);
                let s = b.bind(Value::from(status.as_str()));
                let checker = b.bind(Value::from(checker_id));
                let c = b.bind(optional_text(comment));
                let id = b.bind(Value::from(request_id));
                let sql = format!(
                    "UPDATE {requests} SET status = {s}, checker_id = {checker}, \
                     approval_comment = {c}, processed_at = {} \
                     WHERE request_id = {id} AND status = 'pending'",
                    Self::now_sql(kind)
                );
                NativeCall::Sql(SqlStatement::execute(sql, b.args))
            }
            Self::Document => NativeCall::Document(
                DocumentCommand::new(DocumentOp::Update, requests)
                    .filter(object(json!({"request_id": request_id, "status": "pending"})))
                    .update(object(json!({"$set": {
                        "status": status.as_str(),
                        "checker_id": checker_id,
                        "approval_comment": comment,
                        "processed_at": now_text(),
                    }}))),
            ),
        }
    }

    /// Returns an approved request to `pending`, only while `checker_id` still holds it
    pub fn reopen_request(&self, table: &str, request_id: &str, checker_id: &str) -> NativeCall {
        let requests = requests_table(table);
        match *self {
            Self::Sql { placeholder, .. } => {
                let mut b = SqlBuilder::new(placeholder);
                let id = b.bind(Value::from(request_id));
                let checker = b.bind(Value::from(checker_id));
                let sql = format!(
                    "UPDATE {requests} SET status = 'pending', checker_id = NULL, \
                     approval_comment = NULL, processed_at = NULL \
                     WHERE request_id = {id} AND status = 'approved' AND checker_id = {checker}"
                );
                NativeCall::Sql(SqlStatement::execute(sql, b.args))
            }
            Self::Document => NativeCall::Document(
                DocumentCommand::new(DocumentOp::Update, requests)
                    .filter(object(json!({
                        "request_id": request_id,
                        "status": "approved",
                        "checker_id": checker_id,
                    })))
                    .update(object(json!({"$set": {
                        "status": "pending",
                        "checker_id": null,
                        "approval_comment": null,
                        "processed_at": null,
                    }}))),
            ),
        }
    }

    pub fn table_exists(&self, database: Option<&str>, table: &str) -> NativeCall {
        let database = database.filter(|d| !d.is_empty());
        match *self {
            Self::Sql { kind: BackendKind::Postgres, .. } => NativeCall::Sql(SqlStatement::fetch(
                "SELECT COUNT(*) AS count FROM information_schema.tables \
                 WHERE table_schema = COALESCE((SELECT schema_name::text FROM \
                 information_schema.schemata WHERE schema_name = $1::text), 'public') \
                 AND table_name = $2::text",
                vec![optional_text(database), Value::from(table)],
            )),
            Self::Sql { .. } => NativeCall::Sql(SqlStatement::fetch(
                "SELECT COUNT(*) AS count FROM information_schema.tables \
                 WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?",
                vec![optional_text(database), Value::from(table)],
            )),
            Self::Document => NativeCall::Document(DocumentCommand::list_collections(
                database.map(str::to_string),
                object(json!({"name": table})),
            )),
        }
    }

    /// MySQL takes `database` as a backtick-quoted identifier
    pub fn table_structure(&self, database: Option<&str>, table: &str) -> NativeCall {
        let database = database.filter(|d| !d.is_empty());
        match *self {
            Self::Sql { kind: BackendKind::Postgres, .. } => NativeCall::Sql(SqlStatement::fetch(
                "SELECT column_name::text AS column_name, data_type::text AS data_type, \
                 is_nullable::text AS is_nullable, column_default::text AS column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = COALESCE((SELECT schema_name::text FROM \
                 information_schema.schemata WHERE schema_name = $1::text), 'public') \
                 AND table_name = $2::text ORDER BY ordinal_position",
                vec![optional_text(database), Value::from(table)],
            )),
            Self::Sql { .. } => {
                let target = match database {
                    Some(db) => format!("`{}`.{table}", db.replace('`', "``")),
                    None => table.to_string(),
                };
                NativeCall::Sql(SqlStatement::fetch(format!("DESCRIBE {target}"), Vec::new()))
            }
            Self::Document => {
                let mut command = DocumentCommand::new(DocumentOp::Find, table);
                command.database = database.map(str::to_string);
                command.limit = Some(1);
                NativeCall::Document(command)
            }
        }
    }

    /// Calls that create the entries and requests tables when absent
    pub fn create_schema(&self, table: &str) -> Vec<NativeCall> {
        let requests = requests_table(table);
        match *self {
            Self::Sql { kind: BackendKind::MySql, .. } => vec![
                NativeCall::Sql(SqlStatement::execute(
                    format!(
                        "CREATE TABLE IF NOT EXISTS {table} (\n    \
                         id INT AUTO_INCREMENT PRIMARY KEY,\n    \
                         config_key VARCHAR(255) NOT NULL UNIQUE,\n    \
                         config_value TEXT,\n    \
                         description TEXT,\n    \
                         status ENUM('approved', 'pending', 'rejected') DEFAULT 'approved',\n    \
                         maker_id VARCHAR(255),\n    \
                         checker_id VARCHAR(255),\n    \
                         created_at TIMESTAMP(6) DEFAULT CURRENT_TIMESTAMP(6),\n    \
                         updated_at TIMESTAMP(6) DEFAULT CURRENT_TIMESTAMP(6) ON UPDATE CURRENT_TIMESTAMP(6),\n    \
                         approved_at TIMESTAMP(6) NULL,\n    \
                         approval_comment TEXT,\n    \
                         INDEX idx_status (status),\n    \
                         INDEX idx_maker_id (maker_id)\n)"
                    ),
                    Vec::new(),
                )),
                NativeCall::Sql(SqlStatement::execute(
                    format!(
                        "CREATE TABLE IF NOT EXISTS {requests} (\n    \
                         request_id VARCHAR(64) PRIMARY KEY,\n    \
                         config_key VARCHAR(255) NOT NULL,\n    \
                         config_value TEXT,\n    \
                         description TEXT,\n    \
                         operation ENUM('create', 'update', 'delete') NOT NULL,\n    \
                         maker_id VARCHAR(255) NOT NULL,\n    \
                         checker_id VARCHAR(255),\n    \
                         status ENUM('pending', 'approved', 'rejected') DEFAULT 'pending',\n    \
                         requested_at TIMESTAMP(6) DEFAULT CURRENT_TIMESTAMP(6),\n    \
                         processed_at TIMESTAMP(6) NULL,\n    \
                         approval_comment TEXT,\n    \
                         previous_value TEXT,\n    \
                         INDEX idx_status (status),\n    \
                         INDEX idx_maker_id (maker_id),\n    \
                         INDEX idx_checker_id (checker_id),\n    \
                         INDEX idx_config_key (config_key)\n)"
                    ),
                    Vec::new(),
                )),
            ],
            Self::Sql { .. } => {
                let mut calls = vec![
                    NativeCall::Sql(SqlStatement::execute(
                        format!(
                            "CREATE TABLE IF NOT EXISTS {table} (\n    \
                             id SERIAL PRIMARY KEY,\n    \
                             config_key VARCHAR(255) NOT NULL UNIQUE,\n    \
                             config_value TEXT,\n    \
                             description TEXT,\n    \
                             status VARCHAR(20) DEFAULT 'approved' CHECK (status IN ('approved', 'pending', 'rejected')),\n    \
                             maker_id VARCHAR(255),\n    \
                             checker_id VARCHAR(255),\n    \
                             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    \
                             updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    \
                             approved_at TIMESTAMP,\n    \
                             approval_comment TEXT\n)"
                        ),
                        Vec::new(),
                    )),
                    NativeCall::Sql(SqlStatement::execute(
                        format!(
                            "CREATE TABLE IF NOT EXISTS {requests} (\n    \
                             request_id VARCHAR(64) PRIMARY KEY,\n    \
                             config_key VARCHAR(255) NOT NULL,\n    \
                             config_value TEXT,\n    \
                             description TEXT,\n    \
                             operation VARCHAR(20) NOT NULL CHECK (operation IN ('create', 'update', 'delete')),\n    \
                             maker_id VARCHAR(255) NOT NULL,\n    \
                             checker_id VARCHAR(255),\n    \
                             status VARCHAR(20) DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'rejected')),\n    \
                             requested_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    \
                             processed_at TIMESTAMP,\n    \
                             approval_comment TEXT,\n    \
                             previous_value TEXT\n)"
                        ),
                        Vec::new(),
                    )),
                ];
                let indexes = [
                    ("status", table, "status"),
                    ("maker_id", table, "maker_id"),
                    ("approval_status", requests.as_str(), "status"),
                    ("approval_maker", requests.as_str(), "maker_id"),
                    ("approval_checker", requests.as_str(), "checker_id"),
                ];
                calls.extend(indexes.iter().map(|(suffix, target, column)| {
                    NativeCall::Sql(SqlStatement::execute(
                        format!("CREATE INDEX IF NOT EXISTS idx_{table}_{suffix} ON {target} ({column})"),
                        Vec::new(),
                    ))
                }));
                calls
            }
            Self::Document => {
                let sentinel = EntryWrite::new(SENTINEL_KEY, "initialization")
                    .description(Some("Collection initialization document".to_string()))
                    .maker(Some("system".to_string()));
                vec![
                    NativeCall::Document(
                        DocumentCommand::new(DocumentOp::Insert, table)
                            .document(Self::entry_document(&sentinel)),
                    ),
                    NativeCall::Document(
                        DocumentCommand::new(DocumentOp::CreateIndex, table).index("config_key", true),
                    ),
                    NativeCall::Document(
                        DocumentCommand::new(DocumentOp::Delete, table)
                            .filter(object(json!({"config_key": SENTINEL_KEY}))),
                    ),
                    NativeCall::Document(
                        DocumentCommand::new(DocumentOp::CreateIndex, table).index("status", false),
                    ),
                    NativeCall::Document(
                        DocumentCommand::new(DocumentOp::CreateIndex, requests.as_str())
                            .index("request_id", true),
                    ),
                    NativeCall::Document(
                        DocumentCommand::new(DocumentOp::CreateIndex, requests.as_str())
                            .index("status", false),
                    ),
                    NativeCall::Document(
                        DocumentCommand::new(DocumentOp::CreateIndex, requests.as_str())
                            .index("maker_id", false),
                    ),
                ]
            }
        }
    }

    pub fn drop_tables(&self, table: &str) -> Vec<NativeCall> {
        let requests = requests_table(table);
        match *self {
            Self::Sql { .. } => [requests.as_str(), table]
                .iter()
                .map(|t| {
                    NativeCall::Sql(SqlStatement::execute(
                        format!("DROP TABLE IF EXISTS {t}"),
                        Vec::new(),
                    ))
                })
                .collect(),
            Self::Document => [requests.as_str(), table]
                .iter()
                .map(|t| NativeCall::Document(DocumentCommand::new(DocumentOp::Drop, *t)))
                .collect(),
        }
    }

    /// Human-readable description of [`Dialect::create_schema`]
    pub fn bootstrap_artifact(&self, table: &str) -> Value {
        let calls = self.create_schema(table);
        match *self {
            Self::Sql { kind, .. } => {
                let statements: Vec<String> = calls
                    .into_iter()
                    .filter_map(|call| match call {
                        NativeCall::Sql(stmt) => Some(format!("{};", stmt.sql)),
                        NativeCall::Document(_) => None,
                    })
                    .collect();
                json!({
                    "type": kind.as_str(),
                    "statements": statements,
                })
            }
            Self::Document => {
                let steps: Vec<Value> = calls
                    .into_iter()
                    .filter_map(|call| match call {
                        NativeCall::Document(cmd) => Some(describe_command(&cmd)),
                        NativeCall::Sql(_) => None,
                    })
                    .collect();
                json!({
                    "type": BackendKind::MongoDb.as_str(),
                    "collections": [table, requests_table(table)],
                    "steps": steps,
                })
            }
        }
    }
}

fn describe_command(cmd: &DocumentCommand) -> Value {
    let mut step = Map::new();
    step.insert("op".into(), Value::from(cmd.op.verb()));
    step.insert("collection".into(), json!(cmd.collection));
    if let Some(document) = &cmd.document {
        step.insert("document".into(), Value::Object(document.clone()));
    }
    if !cmd.filter.is_empty() {
        step.insert("filter".into(), Value::Object(cmd.filter.clone()));
    }
    if let Some(index) = &cmd.index {
        step.insert("index".into(), Value::Object(index.keys.clone()));
        step.insert("unique".into(), Value::from(index.unique));
    }
    Value::Object(step)
}
