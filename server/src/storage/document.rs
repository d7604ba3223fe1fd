use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::config::{BackendKind, ConnectionConfig};
use super::error::{Result, StoreError};
use super::result::{QueryResult, Row, WriteAck};
use super::traits::Connector;
use super::translator::{DocumentCommand, DocumentOp, DocumentTranslator, NativeCall, Translator};

const MAX_POOL_SIZE: u32 = 25;
const MAX_IDLE_TIME: Duration = Duration::from_secs(300);
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Connector for the document backend
pub struct DocumentConnector {
    config: ConnectionConfig,
    client: Option<Client>,
    translator: DocumentTranslator,
}

impl DocumentConnector {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        if config.kind != BackendKind::MongoDb {
            return Err(StoreError::validation(format!(
                "{} is not a document backend",
                config.kind
            )));
        }
        config.validate()?;
        Ok(Self {
            config,
            client: None,
            translator: DocumentTranslator,
        })
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> StoreError {
        StoreError::Connection {
            backend: BackendKind::MongoDb,
            message: err.to_string(),
        }
    }

    fn database(&self, name: Option<&str>) -> Result<Database> {
        let client = self
            .client
            .as_ref()
            .ok_or(StoreError::NotConnected(BackendKind::MongoDb))?;
        Ok(client.database(name.unwrap_or(&self.config.database)))
    }

    async fn apply(&self, command: DocumentCommand) -> Result<QueryResult> {
        let database = self.database(command.database.as_deref())?;
        let filter = to_document(&command.filter)?;

        if command.op == DocumentOp::ListCollections {
            let names = database
                .list_collection_names()
                .filter(filter)
                .await
                .map_err(|e| StoreError::backend("failed to list collections", e))?;
            let rows = names
                .into_iter()
                .map(|name| {
                    let mut row = Row::new();
                    row.insert("name".into(), Value::from(name));
                    row
                })
                .collect();
            return Ok(QueryResult::Rows(rows));
        }

        let name = command
            .collection
            .as_deref()
            .ok_or_else(|| StoreError::validation("collection parameter required"))?;
        let collection: Collection<Document> = database.collection(name);
        let verb = command.op.verb();
        let failed = |e: mongodb::error::Error| {
            StoreError::backend(format!("failed to execute {verb} on {name}"), e)
        };

        match command.op {
            DocumentOp::Find => {
                let mut find = collection.find(filter);
                if let Some(sort) = &command.sort {
                    find = find.sort(to_document(sort)?);
                }
                if let Some(limit) = command.limit {
                    find = find.limit(limit);
                }
                if let Some(skip) = command.skip {
                    find = find.skip(skip.unsigned_abs());
                }
                let cursor = find.await.map_err(failed)?;
                let documents: Vec<Document> = cursor.try_collect().await.map_err(failed)?;
                Ok(QueryResult::Rows(documents.into_iter().map(to_row).collect()))
            }
            DocumentOp::FindOne => {
                let mut find = collection.find_one(filter);
                if let Some(sort) = &command.sort {
                    find = find.sort(to_document(sort)?);
                }
                if let Some(skip) = command.skip {
                    find = find.skip(skip.unsigned_abs());
                }
                let found = find.await.map_err(failed)?;
                Ok(found.map_or(QueryResult::Empty, |d| QueryResult::Document(to_row(d))))
            }
            DocumentOp::Insert => {
                let document = command
                    .document
                    .as_ref()
                    .ok_or_else(|| StoreError::validation("document parameter required"))?;
                let result = collection
                    .insert_one(to_document(document)?)
                    .await
                    .map_err(failed)?;
                Ok(QueryResult::Ack(WriteAck {
                    rows_affected: 1,
                    inserted_ids: vec![to_json(result.inserted_id)],
                    ..WriteAck::default()
                }))
            }
            DocumentOp::InsertMany => {
                let documents = command
                    .documents
                    .iter()
                    .map(to_document)
                    .collect::<Result<Vec<_>>>()?;
                let result = collection.insert_many(documents).await.map_err(failed)?;
                let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
                ids.sort_by_key(|(i, _)| *i);
                Ok(QueryResult::Ack(WriteAck {
                    rows_affected: ids.len() as u64,
                    inserted_ids: ids.into_iter().map(|(_, id)| to_json(id)).collect(),
                    ..WriteAck::default()
                }))
            }
            DocumentOp::Update | DocumentOp::UpdateMany | DocumentOp::Upsert => {
                let update = command
                    .update
                    .as_ref()
                    .ok_or_else(|| StoreError::validation("update parameter required"))?;
                let update = to_document(update)?;
                let result = match command.op {
                    DocumentOp::UpdateMany => collection.update_many(filter, update).await,
                    DocumentOp::Upsert => collection.update_one(filter, update).upsert(true).await,
                    _ => collection.update_one(filter, update).await,
                }
                .map_err(failed)?;
                Ok(QueryResult::Ack(WriteAck {
                    rows_affected: result.modified_count,
                    matched: Some(result.matched_count),
                    upserted_id: result.upserted_id.map(to_json),
                    ..WriteAck::default()
                }))
            }
            DocumentOp::Delete | DocumentOp::DeleteMany => {
                let result = match command.op {
                    DocumentOp::DeleteMany => collection.delete_many(filter).await,
                    _ => collection.delete_one(filter).await,
                }
                .map_err(failed)?;
                Ok(QueryResult::Ack(WriteAck::affected(result.deleted_count)))
            }
            DocumentOp::Count => {
                let count = collection.count_documents(filter).await.map_err(failed)?;
                Ok(QueryResult::Count(count))
            }
            DocumentOp::CreateIndex => {
                let index = command
                    .index
                    .as_ref()
                    .ok_or_else(|| StoreError::validation("index parameter required"))?;
                let model = IndexModel::builder()
                    .keys(to_document(&index.keys)?)
                    .options(IndexOptions::builder().unique(index.unique).build())
                    .build();
                let result = collection.create_index(model).await.map_err(failed)?;
                let mut row = Row::new();
                row.insert("index_name".into(), Value::from(result.index_name));
                Ok(QueryResult::Document(row))
            }
            DocumentOp::Drop => {
                collection.drop().await.map_err(failed)?;
                Ok(QueryResult::Ack(WriteAck::default()))
            }
            DocumentOp::ListCollections => Ok(QueryResult::Rows(Vec::new())),
        }
    }
}

#[async_trait]
impl Connector for DocumentConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::MongoDb
    }

    async fn connect(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let mut options = ClientOptions::parse(self.config.connection_string())
            .await
            .map_err(|e| self.connection_error(e))?;
        options.max_pool_size = Some(MAX_POOL_SIZE);
        options.max_idle_time = Some(MAX_IDLE_TIME);
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        let client = Client::with_options(options).map_err(|e| self.connection_error(e))?;
        self.client = Some(client);

        if let Err(err) = self.ping().await {
            self.close().await?;
            return Err(err);
        }
        info!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "Connected to document store"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.database(None)?
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| self.connection_error(e))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
        Ok(())
    }

    fn translator(&self) -> &dyn Translator {
        &self.translator
    }

    async fn run(&self, call: NativeCall) -> Result<QueryResult> {
        let NativeCall::Document(command) = call else {
            return Err(StoreError::unsupported("query", BackendKind::MongoDb));
        };
        if self.client.is_none() {
            return Err(StoreError::NotConnected(BackendKind::MongoDb));
        }
        debug!(op = command.op.verb(), collection = ?command.collection, "Running document command");
        self.apply(command).await
    }
}

fn to_document(row: &Row) -> Result<Document> {
    bson::to_document(row)
        .map_err(|e| StoreError::validation(format!("cannot convert parameters to BSON: {e}")))
}

fn to_json(value: Bson) -> Value {
    value.into_relaxed_extjson()
}

fn to_row(document: Document) -> Row {
    match to_json(Bson::Document(document)) {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}
