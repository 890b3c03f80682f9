use crate::config::AppConfig;
use crate::error::Error;
use crate::hasher::{self, HashEngine, TypeDetector};
use crate::progress::ProgressReporter;
use crate::scanner::{self, CrawlSummary};
use crate::storage::Database;
use crate::store::{self, ContentStore};
use std::path::Path;
use tracing::info;

/// Entry point for every pipeline stage: owns the configuration, the
/// metadata store and the type detector.
pub struct Engine {
    config: AppConfig,
    db: Database,
    detector: Box<dyn TypeDetector>,
}

#[derive(Debug, Default)]
pub struct PurgeSummary {
    pub files: usize,
    pub paths: usize,
}

impl Engine {
    /// Open (or create) the database named by `db_path`.
    pub fn open(config: AppConfig) -> Result<Self, Error> {
        let db = Database::open(&config.db_path)?;
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: AppConfig, db: Database) -> Self {
        let detector = hasher::detector_for(config.type_detector);
        Self {
            config,
            db,
            detector,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The store at `root`, or the configured `zap_data_path`.
    pub fn store(&self, root: Option<&Path>) -> ContentStore {
        match root {
            Some(root) => ContentStore::new(root),
            None => ContentStore::new(self.config.zap_data_path()),
        }
    }

    pub fn crawl(
        &self,
        root: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<CrawlSummary, Error> {
        scanner::crawl(&self.db, &self.config, root, reporter)
    }

    pub fn hash_files(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<hasher::HashSummary, Error> {
        HashEngine::new(&self.db, &self.config, self.detector.as_ref(), reporter)?.run()
    }

    pub fn size_files(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<hasher::SizeSummary, Error> {
        hasher::size_files(&self.db, &self.config, reporter)
    }

    pub fn type_files(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<hasher::TypeSummary, Error> {
        hasher::type_files(&self.db, &self.config, self.detector.as_ref(), reporter)
    }

    pub fn duplicate_hash_sanity_check(
        &self,
        reporter: &dyn ProgressReporter,
    ) -> Result<hasher::SanitySummary, Error> {
        hasher::duplicate_hash_sanity_check(
            &self.db,
            &self.config,
            self.detector.as_ref(),
            reporter,
        )
    }

    pub fn zap(
        &self,
        destination: Option<&Path>,
        safe_mode: bool,
        reporter: &dyn ProgressReporter,
    ) -> Result<store::ZapSummary, Error> {
        let store = self.store(destination);
        store::zap(&self.db, &self.config, &store, safe_mode, reporter)
    }

    pub fn unzap(
        &self,
        source: &Path,
        destination: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<store::UnzapSummary, Error> {
        let store = self.store(Some(source));
        store::unzap(&self.db, &self.config, &store, destination, reporter)
    }

    pub fn integrity(
        &self,
        source: Option<&Path>,
        reporter: &dyn ProgressReporter,
    ) -> Result<store::IntegritySummary, Error> {
        let store = self.store(source);
        store::integrity(&self.db, &self.config, &store, reporter)
    }

    /// Hard-delete tombstoned files and the tombstoned folders no longer
    /// referenced by anything.
    pub fn purge(&self) -> Result<PurgeSummary, Error> {
        let tx = self.db.transaction()?;
        let (files, paths) = self.db.purge_tombstones()?;
        tx.commit()?;
        info!("Purged {} files and {} folders", files, paths);
        Ok(PurgeSummary { files, paths })
    }
}
