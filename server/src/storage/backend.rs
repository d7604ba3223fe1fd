use super::config::{BackendKind, ConnectionConfig};
use super::document::DocumentConnector;
use super::error::Result;
use super::relational::RelationalConnector;
use super::traits::{Connector, ConnectorFactory};

/// Builds unconnected driver-backed connectors
pub fn new_connector(config: &ConnectionConfig) -> Result<Box<dyn Connector>> {
    let connector: Box<dyn Connector> = match config.kind {
        BackendKind::MySql | BackendKind::Postgres => {
            Box::new(RelationalConnector::new(config.clone())?)
        }
        BackendKind::MongoDb => Box::new(DocumentConnector::new(config.clone())?),
    };
    Ok(connector)
}

/// Factory over the real MySQL, PostgreSQL and MongoDB drivers
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnectorFactory;

impl ConnectorFactory for DriverConnectorFactory {
    fn create(&self, config: &ConnectionConfig) -> Result<Box<dyn Connector>> {
        new_connector(config)
    }
}
