use std::fmt::Display;

use parking_lot::Mutex;

use crate::common::PageId;
use crate::concurrency::TransactionId;
use crate::error::Result;
use super::{LogFile, LogRecord};

#[derive(Default)]
struct Inner {
    records: Vec<LogRecord>,
    /// Number of records covered by the last force.
    forced: usize,
    forces: usize,
}

/// In-memory write-ahead log for testing. Keeps every record so it can be inspected.
#[derive(Default)]
pub struct MemoryLog {
    inner: Mutex<Inner>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records appended so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.inner.lock().records.clone()
    }

    /// Records covered by a force.
    pub fn forced_records(&self) -> Vec<LogRecord> {
        let inner = self.inner.lock();
        inner.records[..inner.forced].to_vec()
    }

    /// Number of times force was called.
    pub fn forces(&self) -> usize {
        self.inner.lock().forces
    }
}

impl Display for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory")
    }
}

impl LogFile for MemoryLog {
    fn log_write(&self, tid: TransactionId, pid: PageId, before: &[u8], after: &[u8]) -> Result<()> {
        self.inner.lock().records.push(LogRecord {
            txn: tid.id(),
            page: pid,
            before: before.to_vec(),
            after: after.to_vec(),
        });
        Ok(())
    }

    fn force(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.forced = inner.records.len();
        inner.forces += 1;
        Ok(())
    }
}
