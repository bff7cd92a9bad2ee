//! Page-granularity strict two-phase locking with deadlock detection.
//!
//! Each page has its own lock state and condition variable. A request that conflicts with the
//! current holders records wait-for edges to them and checks the wait-for graph for a cycle
//! reachable from the requester before blocking. A blocked request is woken whenever a holder
//! releases the page, and gives up once its transaction has lived longer than the wait bound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use crate::common::{PageId, DEFAULT_LOCK_TIMEOUT};
use crate::error::{Error, Result};
use super::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Holders of one page: either a set of readers or a single writer.
#[derive(Debug, Default)]
struct LockState {
    readers: HashSet<TransactionId>,
    writer: Option<TransactionId>,
}

impl LockState {
    /// Grants the request if it is compatible with the current holders, otherwise returns the
    /// holders it conflicts with.
    fn try_grant(&mut self, tid: TransactionId, mode: LockMode) -> std::result::Result<(), Vec<TransactionId>> {
        if self.writer == Some(tid) {
            return Ok(());
        }
        if let Some(writer) = self.writer {
            return Err(vec![writer]);
        }
        match mode {
            LockMode::Shared => {
                self.readers.insert(tid);
                Ok(())
            }
            LockMode::Exclusive => {
                if self.readers.iter().all(|r| *r == tid) {
                    // Either free, or tid is the sole reader and converts its lock.
                    self.readers.clear();
                    self.writer = Some(tid);
                    Ok(())
                } else {
                    Err(self.readers.iter().filter(|r| **r != tid).copied().collect())
                }
            }
        }
    }

    /// Removes tid from the holders. Returns true if it held the page.
    fn remove(&mut self, tid: TransactionId) -> bool {
        let was_reader = self.readers.remove(&tid);
        if self.writer == Some(tid) {
            self.writer = None;
            return true;
        }
        was_reader
    }

    fn mode_of(&self, tid: TransactionId) -> Option<LockMode> {
        if self.writer == Some(tid) {
            Some(LockMode::Exclusive)
        } else if self.readers.contains(&tid) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }
}

#[derive(Debug, Default)]
struct PageLock {
    state: Mutex<LockState>,
    released: Condvar,
}

/// Outgoing wait-for edges of a blocked transaction.
#[derive(Debug)]
struct Waits {
    page: PageId,
    holders: HashSet<TransactionId>,
}

/// The lock table shared by every transaction.
#[derive(Debug)]
pub struct LockManager {
    table: Mutex<HashMap<PageId, Arc<PageLock>>>,
    held: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
    waits_for: Mutex<HashMap<TransactionId, Waits>>,
    timeout: Duration,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl LockManager {
    /// Creates a lock manager. A transaction older than `timeout` that has to wait for a lock
    /// is aborted.
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            waits_for: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until tid holds pid in at least the requested mode. Fails with Error::Deadlock if
    /// waiting would close a cycle in the wait-for graph or the transaction outlives the wait
    /// bound; the caller must then abort the transaction.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> Result<()> {
        let lock = self.page_lock(pid);
        let mut state = lock.state.lock();
        loop {
            let holders = match state.try_grant(tid, mode) {
                Ok(()) => break,
                Err(holders) => holders,
            };

            if self.would_deadlock(tid, pid, holders) {
                warn!("{} aborted: waiting for {:?} lock on page {} forms a cycle", tid, mode, pid);
                return Err(Error::Deadlock(format!("{} would deadlock on page {}", tid, pid)));
            }

            let elapsed = tid.elapsed();
            if elapsed >= self.timeout {
                self.waits_for.lock().remove(&tid);
                warn!("{} aborted: lock wait on page {} after {:?}", tid, pid, elapsed);
                return Err(Error::Deadlock(format!(
                    "{} timed out waiting for page {}", tid, pid
                )));
            }

            debug!("{} waiting for {:?} lock on page {}", tid, mode, pid);
            lock.released.wait_for(&mut state, self.timeout - elapsed);
        }
        drop(state);

        self.waits_for.lock().remove(&tid);
        self.held.lock().entry(tid).or_default().insert(pid);
        debug!("{} granted {:?} lock on page {}", tid, mode, pid);
        Ok(())
    }

    /// Releases tid's lock on pid, if any. Breaks strict two-phase locking; only safe for pages
    /// tid has not modified.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        if let Some(pages) = self.held.lock().get_mut(&tid) {
            pages.remove(&pid);
        }
        self.release_page(tid, pid);

        let mut graph = self.waits_for.lock();
        for waits in graph.values_mut().filter(|w| w.page == pid) {
            waits.holders.remove(&tid);
        }
    }

    /// Releases every lock tid holds. Called at transaction end whatever the outcome.
    pub fn release_all(&self, tid: TransactionId) {
        let pages = self.held.lock().remove(&tid).unwrap_or_default();
        for pid in pages.iter() {
            self.release_page(tid, *pid);
        }

        {
            let mut graph = self.waits_for.lock();
            graph.remove(&tid);
            for waits in graph.values_mut() {
                waits.holders.remove(&tid);
            }
        }
        self.prune();
        debug!("{} released {} locks", tid, pages.len());
    }

    /// Returns true if tid holds a lock of any mode on pid.
    pub fn holds(&self, tid: TransactionId, pid: PageId) -> bool {
        self.mode(tid, pid).is_some()
    }

    /// Returns the mode tid holds pid in, if any.
    pub fn mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        let lock = self.table.lock().get(&pid).cloned()?;
        let mode = lock.state.lock().mode_of(tid);
        mode
    }

    /// Returns true if any transaction holds a lock on pid.
    pub fn is_locked(&self, pid: PageId) -> bool {
        match self.table.lock().get(&pid) {
            Some(lock) => !lock.state.lock().is_free(),
            None => false,
        }
    }

    /// Pages tid currently holds locks on.
    pub fn pages_held(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self.held.lock()
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }

    fn page_lock(&self, pid: PageId) -> Arc<PageLock> {
        self.table.lock().entry(pid).or_default().clone()
    }

    fn release_page(&self, tid: TransactionId, pid: PageId) {
        let lock = match self.table.lock().get(&pid) {
            Some(lock) => lock.clone(),
            None => return,
        };
        if lock.state.lock().remove(tid) {
            lock.released.notify_all();
        }
        drop(lock);

        // Drop the entry once nobody holds or waits on it. Waiters keep a clone of the Arc, and
        // clones are only handed out under the table mutex.
        let mut table = self.table.lock();
        let unused = table
            .get(&pid)
            .map(|lock| Arc::strong_count(lock) == 1 && lock.state.lock().is_free())
            .unwrap_or(false);
        if unused {
            table.remove(&pid);
        }
    }

    /// Drops every free entry nobody else refers to. release_page skips entries that were
    /// cloned at the time, such as one briefly held by mode or a waiter that gave up.
    fn prune(&self) {
        self.table
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1 || !lock.state.lock().is_free());
    }

    /// Replaces tid's wait-for edges with edges to holders, then looks for a cycle reachable from
    /// tid. On a cycle the new edges are discarded.
    fn would_deadlock(&self, tid: TransactionId, pid: PageId, holders: Vec<TransactionId>) -> bool {
        let mut graph = self.waits_for.lock();
        graph.insert(tid, Waits { page: pid, holders: holders.into_iter().collect() });

        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        if Self::has_cycle(tid, &graph, &mut visited, &mut on_path) {
            graph.remove(&tid);
            return true;
        }
        false
    }

    fn has_cycle(
        tid: TransactionId,
        graph: &HashMap<TransactionId, Waits>,
        visited: &mut HashSet<TransactionId>,
        on_path: &mut HashSet<TransactionId>,
    ) -> bool {
        if on_path.contains(&tid) {
            return true;
        }
        if !visited.insert(tid) {
            return false;
        }
        on_path.insert(tid);
        if let Some(waits) = graph.get(&tid) {
            for next in waits.holders.iter() {
                if Self::has_cycle(*next, graph, visited, on_path) {
                    return true;
                }
            }
        }
        on_path.remove(&tid);
        false
    }
}
