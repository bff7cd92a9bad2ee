mod file;
mod memory;

use std::fmt::Display;

use serde_derive::{Deserialize, Serialize};

use crate::common::PageId;
use crate::concurrency::TransactionId;
use crate::error::Result;

pub use file::FileLog;
pub use memory::MemoryLog;

/// A page update as recorded in the write-ahead log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub txn: u64,
    pub page: PageId,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
}

/// A write-ahead log. A record for every dirty page must be written and forced before the page
/// itself reaches its table file.
pub trait LogFile: Display + Send + Sync {
    /// Appends an update record for page pid, written by tid.
    fn log_write(&self, tid: TransactionId, pid: PageId, before: &[u8], after: &[u8]) -> Result<()>;

    /// Makes every record appended so far durable.
    fn force(&self) -> Result<()>;
}
