//! In-process document engine.
//!
//! Honours the same [`DocumentCommand`]s as the MongoDB connector so the
//! config store and approval workflow can run without a server. Shared state
//! lives in a [`MemoryEngine`]; every connector built from the same engine
//! sees the same collections.

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::config::{BackendKind, ConnectionConfig};
use super::error::{Result, StoreError};
use super::result::{QueryResult, Row, WriteAck};
use super::traits::{Connector, ConnectorFactory};
use super::translator::{DocumentCommand, DocumentOp, DocumentTranslator, NativeCall, Translator};

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Row>,
    unique_fields: Vec<String>,
    indexes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryEngine {
    /// Keyed by `database.collection`
    collections: Mutex<BTreeMap<String, Collection>>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Collection>>> {
        self.collections
            .lock()
            .map_err(|_| StoreError::backend("memory engine", "state lock poisoned"))
    }
}

pub struct MemoryConnector {
    engine: Arc<MemoryEngine>,
    database: String,
    connected: bool,
    translator: DocumentTranslator,
}

impl MemoryConnector {
    pub fn new(database: impl Into<String>) -> Self {
        Self::with_engine(MemoryEngine::new(), database)
    }

    pub fn with_engine(engine: Arc<MemoryEngine>, database: impl Into<String>) -> Self {
        Self {
            engine,
            database: database.into(),
            connected: false,
            translator: DocumentTranslator,
        }
    }

    pub fn engine(&self) -> Arc<MemoryEngine> {
        Arc::clone(&self.engine)
    }

    fn apply(&self, command: DocumentCommand) -> Result<QueryResult> {
        let database = command.database.as_deref().unwrap_or(&self.database);
        let mut collections = self.engine.lock()?;

        if command.op == DocumentOp::ListCollections {
            let prefix = format!("{database}.");
            let mut names = Vec::new();
            for name in collections.keys().filter_map(|k| k.strip_prefix(&prefix)) {
                let mut row = Row::new();
                row.insert("name".into(), Value::from(name));
                row.insert("type".into(), Value::from("collection"));
                if matches(&row, &command.filter)? {
                    names.push(row);
                }
            }
            return Ok(QueryResult::Rows(names));
        }

        let collection_name = command
            .collection
            .as_deref()
            .ok_or_else(|| StoreError::validation("collection parameter required"))?;
        let namespace = format!("{database}.{collection_name}");

        match command.op {
            DocumentOp::Find | DocumentOp::FindOne | DocumentOp::Count => {
                let Some(collection) = collections.get(&namespace) else {
                    return Ok(match command.op {
                        DocumentOp::Count => QueryResult::Count(0),
                        DocumentOp::FindOne => QueryResult::Empty,
                        _ => QueryResult::Rows(Vec::new()),
                    });
                };
                let mut found = Vec::new();
                for doc in &collection.documents {
                    if matches(doc, &command.filter)? {
                        found.push(doc.clone());
                    }
                }
                if command.op == DocumentOp::Count {
                    return Ok(QueryResult::Count(found.len() as u64));
                }
                if let Some(sort) = &command.sort {
                    sort_documents(&mut found, sort);
                }
                let skip = command.skip.unwrap_or(0).max(0) as usize;
                let mut window = found.into_iter().skip(skip);
                if command.op == DocumentOp::FindOne {
                    return Ok(window.next().map_or(QueryResult::Empty, QueryResult::Document));
                }
                let rows = match command.limit {
                    Some(limit) if limit > 0 => window.take(limit as usize).collect(),
                    _ => window.collect(),
                };
                Ok(QueryResult::Rows(rows))
            }
            DocumentOp::Insert | DocumentOp::InsertMany => {
                let documents = match command.op {
                    DocumentOp::Insert => command.document.into_iter().collect(),
                    _ => command.documents,
                };
                let collection = collections.entry(namespace.clone()).or_default();
                let mut ack = WriteAck::default();
                for mut doc in documents {
                    let id = doc
                        .entry("_id")
                        .or_insert_with(|| Value::from(uuid::Uuid::new_v4().to_string()))
                        .clone();
                    check_unique(&namespace, collection, &doc, None)?;
                    collection.documents.push(doc);
                    ack.rows_affected += 1;
                    ack.inserted_ids.push(id);
                }
                Ok(QueryResult::Ack(ack))
            }
            DocumentOp::Update | DocumentOp::UpdateMany | DocumentOp::Upsert => {
                let update = command
                    .update
                    .ok_or_else(|| StoreError::validation("update parameter required"))?;
                if command.op != DocumentOp::Upsert && !collections.contains_key(&namespace) {
                    return Ok(QueryResult::Ack(WriteAck {
                        matched: Some(0),
                        ..WriteAck::default()
                    }));
                }
                let collection = collections.entry(namespace.clone()).or_default();
                let mut positions = Vec::new();
                for (i, doc) in collection.documents.iter().enumerate() {
                    if matches(doc, &command.filter)? {
                        positions.push(i);
                        if command.op != DocumentOp::UpdateMany {
                            break;
                        }
                    }
                }

                let mut ack = WriteAck {
                    matched: Some(positions.len() as u64),
                    ..WriteAck::default()
                };
                if positions.is_empty() && command.op == DocumentOp::Upsert {
                    let mut doc = seed_from_filter(&command.filter);
                    apply_update(&mut doc, &update, true)?;
                    let id = Value::from(uuid::Uuid::new_v4().to_string());
                    doc.insert("_id".into(), id.clone());
                    check_unique(&namespace, collection, &doc, None)?;
                    collection.documents.push(doc);
                    ack.upserted_id = Some(id);
                    return Ok(QueryResult::Ack(ack));
                }
                for i in positions {
                    let mut doc = collection.documents[i].clone();
                    apply_update(&mut doc, &update, false)?;
                    check_unique(&namespace, collection, &doc, Some(i))?;
                    if collection.documents[i] != doc {
                        collection.documents[i] = doc;
                        ack.rows_affected += 1;
                    }
                }
                Ok(QueryResult::Ack(ack))
            }
            DocumentOp::Delete | DocumentOp::DeleteMany => {
                let Some(collection) = collections.get_mut(&namespace) else {
                    return Ok(QueryResult::Ack(WriteAck::affected(0)));
                };
                let mut doomed = Vec::new();
                for (i, doc) in collection.documents.iter().enumerate() {
                    if matches(doc, &command.filter)? {
                        doomed.push(i);
                        if command.op == DocumentOp::Delete {
                            break;
                        }
                    }
                }
                for i in doomed.iter().rev() {
                    collection.documents.remove(*i);
                }
                Ok(QueryResult::Ack(WriteAck::affected(doomed.len() as u64)))
            }
            DocumentOp::CreateIndex => {
                let index = command
                    .index
                    .ok_or_else(|| StoreError::validation("index parameter required"))?;
                let collection = collections.entry(namespace.clone()).or_default();
                let mut names = Vec::new();
                for field in index.keys.keys() {
                    if index.unique && !collection.unique_fields.contains(field) {
                        collection.unique_fields.push(field.clone());
                        let conflict = collection.documents.iter().enumerate().find_map(|(i, doc)| {
                            check_unique(&namespace, collection, doc, Some(i)).err()
                        });
                        if let Some(err) = conflict {
                            collection.unique_fields.pop();
                            return Err(err);
                        }
                    }
                    let name = format!("{field}_1");
                    if !collection.indexes.contains(&name) {
                        collection.indexes.push(name.clone());
                    }
                    names.push(name);
                }
                let mut row = Row::new();
                row.insert("index_name".into(), Value::from(names.join(",")));
                Ok(QueryResult::Document(row))
            }
            DocumentOp::Drop => {
                collections.remove(&namespace);
                Ok(QueryResult::Ack(WriteAck::default()))
            }
            DocumentOp::ListCollections => Ok(QueryResult::Rows(Vec::new())),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    async fn connect(&mut self) -> Result<()> {
        if !self.connected {
            debug!(database = %self.database, "Opening in-process document store");
            self.connected = true;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected(self.kind()))
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn translator(&self) -> &dyn Translator {
        &self.translator
    }

    async fn run(&self, call: NativeCall) -> Result<QueryResult> {
        if !self.connected {
            return Err(StoreError::NotConnected(self.kind()));
        }
        match call {
            NativeCall::Document(command) => self.apply(command),
            NativeCall::Sql(_) => Err(StoreError::unsupported("query", self.kind())),
        }
    }
}

/// Builds connectors that all share one [`MemoryEngine`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectorFactory {
    engine: Arc<MemoryEngine>,
}

impl MemoryConnectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(&self) -> Arc<MemoryEngine> {
        Arc::clone(&self.engine)
    }
}

impl ConnectorFactory for MemoryConnectorFactory {
    fn create(&self, config: &ConnectionConfig) -> Result<Box<dyn Connector>> {
        config.validate()?;
        Ok(Box::new(MemoryConnector::with_engine(
            self.engine(),
            config.database.clone(),
        )))
    }
}

fn check_unique(
    namespace: &str,
    collection: &Collection,
    doc: &Row,
    skip: Option<usize>,
) -> Result<()> {
    for field in &collection.unique_fields {
        let Some(value) = doc.get(field) else {
            continue;
        };
        let duplicate = collection
            .documents
            .iter()
            .enumerate()
            .any(|(i, other)| Some(i) != skip && other.get(field) == Some(value));
        if duplicate {
            return Err(StoreError::backend(
                "write failed",
                format!(
                    "E11000 duplicate key error collection: {namespace} index: {field}_1 dup key: {{ {field}: {value} }}"
                ),
            ));
        }
    }
    Ok(())
}

fn matches(doc: &Row, filter: &Row) -> Result<bool> {
    for (field, condition) in filter {
        let ok = match field.as_str() {
            "$or" | "$and" => {
                let clauses = condition.as_array().ok_or_else(|| {
                    StoreError::validation(format!("{field} expects an array"))
                })?;
                let mut results = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    let clause = clause.as_object().ok_or_else(|| {
                        StoreError::validation(format!("{field} clauses must be objects"))
                    })?;
                    results.push(matches(doc, clause)?);
                }
                if field == "$or" {
                    results.into_iter().any(|r| r)
                } else {
                    results.into_iter().all(|r| r)
                }
            }
            _ => match_field(doc.get(field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn match_field(actual: Option<&Value>, condition: &Value) -> Result<bool> {
    let actual = actual.unwrap_or(&Value::Null);
    let Some(operators) = condition.as_object().filter(|_| is_operator_object(condition)) else {
        return Ok(actual == condition);
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => actual == operand,
            "$ne" => actual != operand,
            "$in" => operand
                .as_array()
                .ok_or_else(|| StoreError::validation("$in expects an array"))?
                .contains(actual),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| StoreError::validation("$regex expects a string"))?;
                let insensitive = operators
                    .get("$options")
                    .and_then(Value::as_str)
                    .is_some_and(|o| o.contains('i'));
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(insensitive)
                    .build()
                    .map_err(|e| StoreError::validation(format!("invalid $regex: {e}")))?;
                actual.as_str().is_some_and(|s| re.is_match(s))
            }
            "$options" => true,
            other => {
                return Err(StoreError::validation(format!(
                    "unsupported filter operator: {other}"
                )));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seed_from_filter(filter: &Row) -> Row {
    filter
        .iter()
        .filter(|(k, v)| !k.starts_with('$') && !is_operator_object(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn apply_update(doc: &mut Row, update: &Row, inserting: bool) -> Result<()> {
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| StoreError::validation(format!("{op} expects an object")))?;
        match op.as_str() {
            "$set" => {
                for (k, v) in fields {
                    doc.insert(k.clone(), v.clone());
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (k, v) in fields {
                        doc.insert(k.clone(), v.clone());
                    }
                }
            }
            "$unset" => {
                for k in fields.keys() {
                    doc.remove(k);
                }
            }
            other => {
                return Err(StoreError::validation(format!(
                    "unsupported update operator: {other}"
                )));
            }
        }
    }
    Ok(())
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn sort_documents(documents: &mut [Row], sort: &Row) {
    documents.sort_by(|a, b| {
        for (field, direction) in sort {
            let ordering = compare_values(
                a.get(field).unwrap_or(&Value::Null),
                b.get(field).unwrap_or(&Value::Null),
            );
            let ordering = if direction.as_i64() == Some(-1) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
