use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::Config;
use crate::core::catalog::ratings::RatingsGenerator;
use crate::core::catalog::{CatalogImporter, CatalogSync, ProgressTracker};
use crate::core::data::database::Database;
use crate::core::downloads::DownloadManager;
use crate::core::infrastructure::cache::{HybridCache, MetadataCache};
use crate::core::search::SearchService;
use crate::core::services::archive::ArchiveClient;
use crate::core::services::metadata::{MetadataService, SharedCache, SharedDatabase};
use crate::error::Result;

/// Builds core services from one configuration so commands don't repeat
/// the wiring.
pub struct ServiceFactory {
    config: Arc<Config>,
}

impl ServiceFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn create_database(&self) -> Result<Database> {
        Database::open(&self.config.database_path)
    }

    pub fn create_shared_database(&self) -> Result<SharedDatabase> {
        Ok(Arc::new(Mutex::new(self.create_database()?)))
    }

    pub fn create_archive_client(&self) -> Result<ArchiveClient> {
        ArchiveClient::new(&self.config)
    }

    /// File cache, fronted by Redis when a URL is configured.
    pub fn create_cache(&self) -> Result<HybridCache> {
        HybridCache::new(
            self.config.cache_dir(),
            self.config.redis_url.as_deref(),
            self.config.cache_max_age_hours,
        )
    }

    pub fn create_shared_cache(&self) -> Result<SharedCache> {
        let cache: Box<dyn MetadataCache> = Box::new(self.create_cache()?);
        Ok(Arc::new(AsyncMutex::new(cache)))
    }

    pub fn create_metadata_service(&self, db: SharedDatabase) -> Result<MetadataService> {
        Ok(MetadataService::new(
            self.create_archive_client()?,
            self.create_shared_cache()?,
            db,
        ))
    }

    pub fn create_download_manager(&self, db: SharedDatabase) -> Result<DownloadManager> {
        let metadata = self.create_metadata_service(db.clone())?;
        Ok(DownloadManager::new(
            metadata,
            db,
            self.config.download_dir.clone(),
            self.config.preferred_formats.clone(),
        ))
    }

    pub fn create_search_service(&self) -> SearchService {
        SearchService::new(self.config.database_path.clone())
    }

    pub fn create_catalog_sync(&self, progress: ProgressTracker, start_year: i32, end_year: i32) -> Result<CatalogSync> {
        Ok(CatalogSync::new(self.create_archive_client()?, progress, start_year, end_year))
    }

    pub fn create_importer(&self, progress: ProgressTracker) -> CatalogImporter {
        CatalogImporter::new(progress)
    }

    pub fn create_ratings_generator(&self, db: SharedDatabase, progress: ProgressTracker) -> Result<RatingsGenerator> {
        Ok(RatingsGenerator::new(self.create_metadata_service(db)?, progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_wires_services_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database_path = dir.path().join("deadarchive.db");
        config.download_dir = dir.path().join("music");
        config.redis_url = None;

        let factory = ServiceFactory::new(Arc::new(config));
        let db = factory.create_shared_database().unwrap();
        let manager = factory.create_download_manager(db).unwrap();
        assert_eq!(manager.download_dir(), dir.path().join("music"));
        assert!(manager.list(None).unwrap().is_empty());

        let search = factory.create_search_service();
        assert!(search.search("1977", 5).await.unwrap().is_empty());
    }
}
