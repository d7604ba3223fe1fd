pub mod approval;
mod backend;
mod config;
pub mod deadline;
pub mod dialect;
pub mod dispatch;
mod document;
mod error;
mod memory;
mod relational;
mod result;
mod store;
mod traits;
pub mod translator;

#[cfg(test)]
mod tests;

pub use approval::{ApprovalWorkflow, ChangeProposal};
pub use backend::{DriverConnectorFactory, new_connector};
pub use config::{BackendKind, ConnectionConfig};
pub use dialect::{Dialect, EntryWrite};
pub use dispatch::{ConfigOperation, GenericOperation, run_config_operation, run_generic_operation};
pub use document::DocumentConnector;
pub use error::{Result, StoreError};
pub use memory::{MemoryConnector, MemoryConnectorFactory, MemoryEngine};
pub use relational::RelationalConnector;
pub use result::{QueryResult, Row, WriteAck};
pub use store::{ConfigStore, TableReport};
pub use traits::{Connector, ConnectorFactory, LIVENESS_TIMEOUT};
pub use translator::{NativeCall, OperationArgs, Translator};
