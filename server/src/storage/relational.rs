use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Column, Connection, Database, Encode, Row as _, Type, TypeInfo, ValueRef as _};
use std::time::Duration;
use tracing::{debug, info};

use super::config::{BackendKind, ConnectionConfig};
use super::error::{Result, StoreError};
use super::result::{QueryResult, Row, WriteAck};
use super::traits::Connector;
use super::translator::{NativeCall, SqlMode, SqlStatement, SqlTranslator, Translator};

const MAX_CONNECTIONS: u32 = 25;
const MAX_LIFETIME: Duration = Duration::from_secs(300);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

enum SqlPool {
    MySql(MySqlPool),
    Postgres(PgPool),
}

/// Connector for both relational variants, backed by an sqlx pool
pub struct RelationalConnector {
    config: ConnectionConfig,
    pool: Option<SqlPool>,
    translator: SqlTranslator,
}

impl RelationalConnector {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        if !config.kind.is_relational() {
            return Err(StoreError::validation(format!(
                "{} is not a relational backend",
                config.kind
            )));
        }
        config.validate()?;
        Ok(Self {
            translator: SqlTranslator::new(config.kind),
            config,
            pool: None,
        })
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> StoreError {
        StoreError::Connection {
            backend: self.config.kind,
            message: err.to_string(),
        }
    }

    async fn open_pool(&self) -> Result<SqlPool> {
        let c = &self.config;
        let username = c.username.as_deref().unwrap_or_default();
        let password = c.password.as_deref().unwrap_or_default();
        match c.kind {
            BackendKind::MySql => {
                let options = MySqlConnectOptions::new()
                    .host(&c.host)
                    .port(c.port)
                    .username(username)
                    .password(password)
                    .database(&c.database);
                let pool = MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .max_lifetime(MAX_LIFETIME)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(|e| self.connection_error(e))?;
                Ok(SqlPool::MySql(pool))
            }
            BackendKind::Postgres => {
                let ssl_mode: PgSslMode = c.effective_ssl_mode().parse().map_err(|e| {
                    StoreError::validation(format!("invalid ssl_mode {:?}: {e}", c.ssl_mode))
                })?;
                let options = PgConnectOptions::new()
                    .host(&c.host)
                    .port(c.port)
                    .username(username)
                    .password(password)
                    .database(&c.database)
                    .ssl_mode(ssl_mode);
                let pool = PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .max_lifetime(MAX_LIFETIME)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(|e| self.connection_error(e))?;
                Ok(SqlPool::Postgres(pool))
            }
            BackendKind::MongoDb => Err(StoreError::unsupported("connect", c.kind)),
        }
    }

    fn pool(&self) -> Result<&SqlPool> {
        self.pool
            .as_ref()
            .ok_or(StoreError::NotConnected(self.config.kind))
    }
}

#[async_trait]
impl Connector for RelationalConnector {
    fn kind(&self) -> BackendKind {
        self.config.kind
    }

    async fn connect(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let pool = self.open_pool().await?;
        self.pool = Some(pool);
        if let Err(err) = self.ping().await {
            self.close().await?;
            return Err(err);
        }
        info!(
            backend = %self.config.kind,
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "Connected"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let result = match self.pool()? {
            SqlPool::MySql(pool) => match pool.acquire().await {
                Ok(mut conn) => conn.ping().await,
                Err(e) => Err(e),
            },
            SqlPool::Postgres(pool) => match pool.acquire().await {
                Ok(mut conn) => conn.ping().await,
                Err(e) => Err(e),
            },
        };
        result.map_err(|e| self.connection_error(e))
    }

    async fn close(&mut self) -> Result<()> {
        match self.pool.take() {
            Some(SqlPool::MySql(pool)) => pool.close().await,
            Some(SqlPool::Postgres(pool)) => pool.close().await,
            None => {}
        }
        Ok(())
    }

    fn translator(&self) -> &dyn Translator {
        &self.translator
    }

    async fn run(&self, call: NativeCall) -> Result<QueryResult> {
        let NativeCall::Sql(stmt) = call else {
            return Err(StoreError::unsupported("document command", self.config.kind));
        };
        let pool = self.pool()?;
        debug!(backend = %self.config.kind, sql = %stmt.sql, args = stmt.args.len(), "Running statement");
        match pool {
            SqlPool::MySql(pool) => run_mysql(pool, &stmt).await,
            SqlPool::Postgres(pool) => run_postgres(pool, &stmt).await,
        }
    }
}

fn execution_error(stmt: &SqlStatement, err: sqlx::Error) -> StoreError {
    let context = match stmt.mode {
        SqlMode::Fetch => "failed to execute query",
        SqlMode::Execute => "failed to execute statement",
    };
    StoreError::backend(context, err)
}

async fn run_mysql(pool: &MySqlPool, stmt: &SqlStatement) -> Result<QueryResult> {
    match stmt.mode {
        SqlMode::Fetch => {
            let result = if stmt.args.is_empty() {
                sqlx::raw_sql(&stmt.sql).fetch_all(pool).await
            } else {
                bind_all(sqlx::query(&stmt.sql), &stmt.args)
                    .fetch_all(pool)
                    .await
            };
            let rows = result.map_err(|e| execution_error(stmt, e))?;
            Ok(QueryResult::Rows(rows.iter().map(mysql_row).collect()))
        }
        SqlMode::Execute => {
            let result = if stmt.args.is_empty() {
                sqlx::raw_sql(&stmt.sql).execute(pool).await
            } else {
                bind_all(sqlx::query(&stmt.sql), &stmt.args)
                    .execute(pool)
                    .await
            };
            let done = result.map_err(|e| execution_error(stmt, e))?;
            Ok(QueryResult::Ack(WriteAck {
                rows_affected: done.rows_affected(),
                last_insert_id: Some(done.last_insert_id()).filter(|id| *id > 0),
                ..WriteAck::default()
            }))
        }
    }
}

async fn run_postgres(pool: &PgPool, stmt: &SqlStatement) -> Result<QueryResult> {
    match stmt.mode {
        SqlMode::Fetch => {
            let result = if stmt.args.is_empty() {
                sqlx::raw_sql(&stmt.sql).fetch_all(pool).await
            } else {
                bind_all(sqlx::query(&stmt.sql), &stmt.args)
                    .fetch_all(pool)
                    .await
            };
            let rows = result.map_err(|e| execution_error(stmt, e))?;
            Ok(QueryResult::Rows(rows.iter().map(pg_row).collect()))
        }
        SqlMode::Execute => {
            let result = if stmt.args.is_empty() {
                sqlx::raw_sql(&stmt.sql).execute(pool).await
            } else {
                bind_all(sqlx::query(&stmt.sql), &stmt.args)
                    .execute(pool)
                    .await
            };
            let done = result.map_err(|e| execution_error(stmt, e))?;
            Ok(QueryResult::Ack(WriteAck::affected(done.rows_affected())))
        }
    }
}

fn bind_all<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    args: &[Value],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
{
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn text_fallback<R>(row: &R, index: usize) -> Value
where
    R: sqlx::Row,
    for<'r> String: sqlx::Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: sqlx::Decode<'r, R::Database> + Type<R::Database>,
    usize: sqlx::ColumnIndex<R>,
{
    row.try_get::<String, _>(index)
        .or_else(|_| row.try_get_unchecked::<String, _>(index))
        .or_else(|_| {
            row.try_get_unchecked::<Vec<u8>, _>(index)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        })
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn lossy_text(bytes: Vec<u8>) -> Value {
    Value::String(String::from_utf8_lossy(&bytes).into_owned())
}

fn pg_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let i = column.ordinal();
            (column.name().to_string(), pg_value(row, i, column.type_info().name()))
        })
        .collect()
}

fn pg_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    if row.try_get_raw(i).map_or(true, |raw| raw.is_null()) {
        return Value::Null;
    }
    let decoded = match type_name {
        "INT2" => row.try_get::<i16, _>(i).map(Value::from),
        "INT4" => row.try_get::<i32, _>(i).map(Value::from),
        "INT8" => row.try_get::<i64, _>(i).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(i).map(|f| Value::from(f64::from(f))),
        "FLOAT8" => row.try_get::<f64, _>(i).map(Value::from),
        "BOOL" => row.try_get::<bool, _>(i).map(Value::from),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(i)
            .map(|t| Value::from(t.and_utc().to_rfc3339())),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(i)
            .map(|t| Value::from(t.to_rfc3339())),
        "DATE" => row.try_get::<NaiveDate, _>(i).map(|d| Value::from(d.to_string())),
        "JSON" | "JSONB" => row.try_get::<Value, _>(i),
        "BYTEA" => row.try_get::<Vec<u8>, _>(i).map(lossy_text),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(i)
            .map(|u| Value::from(u.to_string())),
        _ => return text_fallback(row, i),
    };
    decoded.unwrap_or_else(|_| text_fallback(row, i))
}

fn mysql_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let i = column.ordinal();
            (column.name().to_string(), mysql_value(row, i, column.type_info().name()))
        })
        .collect()
}

fn mysql_value(row: &MySqlRow, i: usize, type_name: &str) -> Value {
    if row.try_get_raw(i).map_or(true, |raw| raw.is_null()) {
        return Value::Null;
    }
    let decoded = match type_name {
        t if t.ends_with("UNSIGNED") => row.try_get::<u64, _>(i).map(Value::from),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(i).map(Value::from)
        }
        "BOOLEAN" => row.try_get::<bool, _>(i).map(Value::from),
        "FLOAT" => row.try_get::<f32, _>(i).map(|f| Value::from(f64::from(f))),
        "DOUBLE" => row.try_get::<f64, _>(i).map(Value::from),
        "TIMESTAMP" => row
            .try_get::<DateTime<Utc>, _>(i)
            .map(|t| Value::from(t.to_rfc3339())),
        "DATETIME" => row
            .try_get::<NaiveDateTime, _>(i)
            .map(|t| Value::from(t.and_utc().to_rfc3339())),
        "DATE" => row.try_get::<NaiveDate, _>(i).map(|d| Value::from(d.to_string())),
        "JSON" => row.try_get::<Value, _>(i),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            row.try_get::<Vec<u8>, _>(i).map(lossy_text)
        }
        _ => return text_fallback(row, i),
    };
    decoded.unwrap_or_else(|_| text_fallback(row, i))
}
