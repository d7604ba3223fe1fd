use crate::storage::ConnectorFactory;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub factory: Arc<dyn ConnectorFactory>,
    pub app_name: String,
    /// Entries table used when a request names none
    pub default_table: String,
}

impl AppState {
    pub fn new(
        factory: Arc<dyn ConnectorFactory>,
        app_name: impl Into<String>,
        default_table: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            app_name: app_name.into(),
            default_table: default_table.into(),
        }
    }
}
