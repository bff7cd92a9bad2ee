use std::fs;
use std::sync::Arc;

use log::info;

use crate::buffer::BufferPool;
use crate::common::TableID;
use crate::concurrency::{LockMode, Transaction};
use crate::config::Config;
use crate::error::Result;
use crate::storage::log::{FileLog, LogFile};
use crate::storage::tuple::TupleDesc;
use crate::storage::{Catalog, DbIterator, HeapFile};

/// A database: a directory of heap files sharing one catalog, buffer pool, and write-ahead log.
pub struct Database {
    config: Config,
    catalog: Arc<Catalog>,
    pool: Arc<BufferPool>,
    log: Arc<dyn LogFile>,
}

impl Database {
    /// Opens the database in config.data_dir, logging to its write-ahead log file.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let log = Arc::new(FileLog::open(config.wal_path(), config.sync)?);
        Self::with_log(config, log)
    }

    /// Opens the database in config.data_dir with a caller-provided log.
    pub fn with_log(config: Config, log: Arc<dyn LogFile>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        let catalog = Arc::new(Catalog::new());
        let pool = Arc::new(BufferPool::new(
            config.buffer_pages,
            catalog.clone(),
            log.clone(),
            config.lock_timeout(),
        ));
        info!(
            "Opened database in {} with {} buffer pages of {} bytes, log {}",
            config.data_dir.display(),
            config.buffer_pages,
            config.page_size,
            log
        );
        Ok(Self { config, catalog, pool, log })
    }

    /// Opens or creates the heap file for table name and registers it.
    pub fn create_table(&self, name: &str, desc: TupleDesc) -> Result<TableID> {
        let path = self.config.data_dir.join(format!("{}.dat", name));
        let file = HeapFile::open(path, desc, self.config.page_size)?;
        self.catalog.add_table(Arc::new(file), name)
    }

    /// Starts a transaction. It aborts on drop unless committed.
    pub fn begin(&self) -> Transaction {
        Transaction::begin(self.pool.clone())
    }

    /// Scans table within txn, locking every page in mode.
    pub fn scan(&self, txn: &Transaction, table: TableID, mode: LockMode) -> Result<Box<dyn DbIterator + Send>> {
        Ok(self.catalog.file(table)?.scan(txn.id(), self.pool.clone(), mode))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn log(&self) -> &Arc<dyn LogFile> {
        &self.log
    }
}
