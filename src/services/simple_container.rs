use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::core::services::metadata::SharedDatabase;
use crate::error::Result;
use crate::services::ServiceFactory;

/// Per-invocation service container. The writer connection is opened on
/// first use and shared by every service that needs it.
pub struct SimpleServices {
    factory: ServiceFactory,
    database: OnceLock<SharedDatabase>,
}

impl SimpleServices {
    pub fn new(config: Config) -> Self {
        Self {
            factory: ServiceFactory::new(Arc::new(config)),
            database: OnceLock::new(),
        }
    }

    pub fn config(&self) -> Arc<Config> {
        self.factory.config()
    }

    pub fn factory(&self) -> &ServiceFactory {
        &self.factory
    }

    pub fn database(&self) -> Result<SharedDatabase> {
        if let Some(db) = self.database.get() {
            return Ok(db.clone());
        }
        let db = self.factory.create_shared_database()?;
        Ok(self.database.get_or_init(|| db).clone())
    }
}
