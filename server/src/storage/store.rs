use serde::Serialize;
use serde_json::{Map, Value};
use shared_types::{BatchSummary, ConfigEntry, ConfigItem, ItemOutcome, Page, Visibility};
use tracing::{debug, info, instrument};

use super::dialect::{self, Dialect, EntryQuery, EntryWrite};
use super::error::{Result, StoreError};
use super::result::{QueryResult, Row, WriteAck};
use super::traits::Connector;
use super::translator::NativeCall;

/// Result of a table check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<Vec<Row>>,
    /// Entries of every status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// What `create_table` would run, present when the table is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_table_sql: Option<Value>,
}

/// CRUD, search and schema management over one entries table.
///
/// Holds no entry state; every call goes straight to the connector.
pub struct ConfigStore<'a> {
    connector: &'a dyn Connector,
    dialect: Dialect,
    table: String,
}

fn require_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(StoreError::validation("config key is required"));
    }
    Ok(())
}

fn decode_entry(row: Row) -> Result<ConfigEntry> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| StoreError::backend("failed to decode config entry", e))
}

fn decode_entries(result: QueryResult) -> Result<Vec<ConfigEntry>> {
    result.into_rows().into_iter().map(decode_entry).collect()
}

fn outcome<T: Serialize>(result: Result<T>) -> ItemOutcome {
    match result {
        Ok(value) => ItemOutcome::Success {
            result: serde_json::to_value(value).unwrap_or(Value::Null),
        },
        Err(err) => ItemOutcome::Failure {
            error: err.to_string(),
        },
    }
}

impl<'a> ConfigStore<'a> {
    pub fn new(connector: &'a dyn Connector, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        dialect::validate_identifier(&table)?;
        Ok(Self {
            dialect: Dialect::for_backend(connector.kind()),
            connector,
            table,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) async fn run(&self, call: NativeCall) -> Result<QueryResult> {
        self.connector.run(call).await
    }

    #[instrument(skip(self, write), fields(table = %self.table, key = %write.key))]
    pub async fn create_direct(&self, write: &EntryWrite) -> Result<WriteAck> {
        require_key(&write.key)?;
        let ack = self
            .run(self.dialect.insert_entry(&self.table, write))
            .await?
            .into_ack();
        info!("Created config entry");
        Ok(ack)
    }

    #[instrument(skip(self, write), fields(table = %self.table, key = %write.key))]
    pub async fn update_direct(&self, write: &EntryWrite) -> Result<WriteAck> {
        require_key(&write.key)?;
        let ack = self
            .run(self.dialect.upsert_entry(&self.table, write))
            .await?
            .into_ack();
        info!("Updated config entry");
        Ok(ack)
    }

    /// Removing an absent key is not an error
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn delete_direct(&self, key: &str) -> Result<WriteAck> {
        require_key(key)?;
        let ack = self
            .run(self.dialect.delete_entry(&self.table, key))
            .await?
            .into_ack();
        info!(deleted = ack.rows_affected, "Deleted config entry");
        Ok(ack)
    }

    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn delete_all(&self) -> Result<WriteAck> {
        let ack = self.run(self.dialect.delete_all(&self.table)).await?.into_ack();
        info!(deleted = ack.rows_affected, "Deleted all config entries");
        Ok(ack)
    }

    async fn select(&self, query: &EntryQuery<'_>) -> Result<Vec<ConfigEntry>> {
        decode_entries(self.run(self.dialect.select_entries(&self.table, query)).await?)
    }

    pub async fn read(&self, key: &str, visibility: Visibility) -> Result<Option<ConfigEntry>> {
        require_key(key)?;
        let query = EntryQuery::new(visibility).key(key);
        let result = self
            .run(self.dialect.select_entries(&self.table, &query))
            .await?;
        result.into_first().map(decode_entry).transpose()
    }

    pub async fn read_all(&self, visibility: Visibility, page: Page) -> Result<Vec<ConfigEntry>> {
        self.select(&EntryQuery::new(visibility).page(page)).await
    }

    /// Case-insensitive substring match on key, value or description
    pub async fn search(
        &self,
        term: &str,
        visibility: Visibility,
        page: Page,
    ) -> Result<Vec<ConfigEntry>> {
        if term.is_empty() {
            return Err(StoreError::validation("search_term is required"));
        }
        self.select(&EntryQuery::new(visibility).search(term).page(page))
            .await
    }

    /// Exact-match conjunction over the given fields
    pub async fn filter(
        &self,
        criteria: &Map<String, Value>,
        visibility: Visibility,
        page: Page,
    ) -> Result<Vec<ConfigEntry>> {
        let resolved = criteria
            .iter()
            .map(|(field, value)| Ok((dialect::entry_column(field)?, value.clone())))
            .collect::<Result<Vec<_>>>()?;
        debug!(table = %self.table, fields = resolved.len(), "Filtering config entries");
        self.select(&EntryQuery::new(visibility).criteria(resolved).page(page))
            .await
    }

    pub async fn count(&self, visibility: Visibility) -> Result<u64> {
        let query = EntryQuery::new(visibility);
        self.run(self.dialect.count_entries(&self.table, &query))
            .await?
            .into_count()
    }

    pub async fn exists(&self, key: &str, visibility: Visibility) -> Result<bool> {
        require_key(key)?;
        let query = EntryQuery::new(visibility).key(key);
        let count = self
            .run(self.dialect.count_entries(&self.table, &query))
            .await?
            .into_count()?;
        Ok(count > 0)
    }

    fn item_write(item: &ConfigItem, maker_id: Option<&str>) -> EntryWrite {
        EntryWrite::new(item.key.clone(), item.value.clone())
            .description(item.description.clone())
            .maker(item.maker_id.clone().or_else(|| maker_id.map(str::to_string)))
    }

    /// Creates each item independently; failures are reported, not raised
    pub async fn create_batch(&self, items: &[ConfigItem], maker_id: Option<&str>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for item in items {
            let result = self.create_direct(&Self::item_write(item, maker_id)).await;
            summary.record(item.key.clone(), outcome(result));
        }
        info!(
            table = %self.table,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "Batch create finished"
        );
        summary
    }

    pub async fn update_batch(&self, items: &[ConfigItem], maker_id: Option<&str>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for item in items {
            let result = self.update_direct(&Self::item_write(item, maker_id)).await;
            summary.record(item.key.clone(), outcome(result));
        }
        info!(
            table = %self.table,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "Batch update finished"
        );
        summary
    }

    pub async fn delete_batch(&self, keys: &[String]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for key in keys {
            let result = self.delete_direct(key).await;
            summary.record(key.clone(), outcome(result));
        }
        info!(
            table = %self.table,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "Batch delete finished"
        );
        summary
    }

    pub async fn table_exists(&self, database: Option<&str>) -> Result<bool> {
        let result = self
            .run(self.dialect.table_exists(database, &self.table))
            .await?;
        match self.dialect {
            Dialect::Document => Ok(!result.into_rows().is_empty()),
            Dialect::Sql { .. } => Ok(result.into_count()? > 0),
        }
    }

    pub async fn table_structure(&self, database: Option<&str>) -> Result<Vec<Row>> {
        Ok(self
            .run(self.dialect.table_structure(database, &self.table))
            .await?
            .into_rows())
    }

    /// Creates the entries and requests tables; returns whether anything ran
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn create_table_if_missing(&self) -> Result<bool> {
        if self.table_exists(None).await? {
            debug!("Table already present");
            return Ok(false);
        }
        for call in self.dialect.create_schema(&self.table) {
            self.run(call).await?;
        }
        info!("Created config tables");
        Ok(true)
    }

    pub fn bootstrap_artifact(&self) -> Value {
        self.dialect.bootstrap_artifact(&self.table)
    }

    pub async fn inspect(&self, database: Option<&str>) -> Result<TableReport> {
        let mut report = TableReport {
            table: self.table.clone(),
            exists: self.table_exists(database).await?,
            structure: None,
            count: None,
            create_table_sql: None,
        };
        if report.exists {
            report.structure = Some(self.table_structure(database).await?);
            report.count = Some(self.count(Visibility::All).await?);
        } else {
            report.create_table_sql = Some(self.bootstrap_artifact());
        }
        Ok(report)
    }

    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn drop_tables(&self) -> Result<()> {
        for call in self.dialect.drop_tables(&self.table) {
            self.run(call).await?;
        }
        info!("Dropped config tables");
        Ok(())
    }
}
