use std::path::PathBuf;
use std::time::Duration;

use serde_derive::Deserialize;

use crate::common::{DEFAULT_BUFFER_PAGES, DEFAULT_LOCK_TIMEOUT, DEFAULT_PAGE_SIZE};
use crate::error::{Error, Result};

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    /// Directory holding the table files and the write-ahead log.
    pub data_dir: PathBuf,
    /// Bytes per page.
    pub page_size: usize,
    /// Maximum number of pages resident in the buffer pool.
    pub buffer_pages: usize,
    /// How long a transaction may live before a blocked lock request aborts it.
    pub lock_timeout_ms: u64,
    /// Write-ahead log file name, relative to `data_dir`.
    pub wal_file: String,
    /// Whether forcing the log also syncs it to disk.
    pub sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pages: DEFAULT_BUFFER_PAGES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            wal_file: "wal.log".into(),
            sync: true,
        }
    }
}

impl Config {
    /// Loads the configuration from defaults, an optional file, and `HEAPDB_*` environment
    /// variables, in increasing order of precedence.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut c = config::Config::builder()
            .set_default("data_dir", "data")?
            .set_default("page_size", DEFAULT_PAGE_SIZE as i64)?
            .set_default("buffer_pages", DEFAULT_BUFFER_PAGES as i64)?
            .set_default("lock_timeout_ms", DEFAULT_LOCK_TIMEOUT.as_millis() as i64)?
            .set_default("wal_file", "wal.log")?
            .set_default("sync", true)?;
        if let Some(file) = file {
            c = c.add_source(config::File::with_name(file));
        }
        c = c.add_source(config::Environment::with_prefix("HEAPDB"));

        let cfg: Self = c.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be positive".into()));
        }
        if self.buffer_pages == 0 {
            return Err(Error::Config("buffer_pages must be positive".into()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}
