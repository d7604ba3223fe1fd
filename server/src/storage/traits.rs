use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::config::{BackendKind, ConnectionConfig};
use super::error::{Result, StoreError};
use super::result::QueryResult;
use super::translator::{NativeCall, OperationArgs, Translator};

/// Upper bound on a liveness probe
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(2);

/// A live handle on one backend instance.
///
/// `connect` must succeed before `run`, `execute` or `query`; those return
/// [`StoreError::NotConnected`] otherwise. `close` may be called any number of
/// times.
#[async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn connect(&mut self) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    fn translator(&self) -> &dyn Translator;

    /// Executes a call already in the backend's native shape
    async fn run(&self, call: NativeCall) -> Result<QueryResult>;

    async fn execute(&self, verb: &str, args: &OperationArgs) -> Result<QueryResult> {
        let call = self.translator().translate(verb, args)?;
        self.run(call).await
    }

    /// Raw parameterized statement, relational backends only
    async fn query(&self, sql: &str, args: Vec<Value>) -> Result<QueryResult> {
        if !self.kind().is_relational() {
            return Err(StoreError::unsupported("query", self.kind()));
        }
        self.execute("query", &OperationArgs::sql(sql, args)).await
    }

    /// Live probe, not a cached flag
    async fn is_connected(&self) -> bool {
        matches!(
            tokio::time::timeout(LIVENESS_TIMEOUT, self.ping()).await,
            Ok(Ok(()))
        )
    }
}

pub trait ConnectorFactory: Send + Sync {
    /// Builds an unconnected connector for the descriptor
    fn create(&self, config: &ConnectionConfig) -> Result<Box<dyn Connector>>;
}
