use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::buffer::BufferPool;
use crate::error::Result;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a unit of work. Ids are unique and increasing across the process. The start
/// instant is only used by the lock manager to bound how long a transaction may wait.
#[derive(Clone, Copy, Debug)]
pub struct TransactionId {
    id: u64,
    started: Instant,
}

impl TransactionId {
    pub fn new() -> Self {
        Self { id: NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst), started: Instant::now() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Time elapsed since the transaction was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TransactionId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TransactionId {}

impl Hash for TransactionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn#{}", self.id)
    }
}

/// A running transaction against a buffer pool. Dropping it without committing aborts it.
pub struct Transaction {
    id: TransactionId,
    pool: Arc<BufferPool>,
    done: bool,
}

impl Transaction {
    /// Begins a new transaction.
    pub fn begin(pool: Arc<BufferPool>) -> Self {
        let id = TransactionId::new();
        debug!("Beginning {}", id);
        Self { id, pool, done: false }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Commits the transaction: flushes its dirty pages through the log and releases its locks.
    /// If the flush fails the transaction is rolled back before the error is returned.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        self.pool.commit(self.id)
    }

    /// Aborts the transaction, discarding its dirty pages and releasing its locks.
    pub fn abort(mut self) {
        self.done = true;
        self.pool.abort(self.id);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.done {
            self.pool.abort(self.id);
        }
    }
}
