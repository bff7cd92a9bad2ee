use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::{PageId, TableID};
use crate::concurrency::{LockManager, LockMode, TransactionId};
use crate::error::{Error, Result};
use crate::storage::log::LogFile;
use crate::storage::page::PageRef;
use crate::storage::tuple::Tuple;
use crate::storage::Catalog;

/// Caches up to `capacity` pages and hands them out to transactions under page locks.
///
/// The pool follows a no-steal policy: a page dirtied by a transaction stays in memory until the
/// transaction commits, when it is logged and written back, or aborts, when it is dropped so the
/// next reader sees the persisted version. Only clean, unlocked pages are evicted.
pub struct BufferPool {
    capacity: usize,
    pages: Mutex<HashMap<PageId, PageRef>>,
    locks: LockManager,
    catalog: Arc<Catalog>,
    log: Arc<dyn LogFile>,
}

impl BufferPool {
    /// Creates a buffer pool holding at most capacity pages, reading and writing tables through
    /// catalog and logging page writes to log.
    pub fn new(capacity: usize, catalog: Arc<Catalog>, log: Arc<dyn LogFile>, lock_timeout: Duration) -> Self {
        Self {
            capacity,
            pages: Mutex::new(HashMap::new()),
            locks: LockManager::new(lock_timeout),
            catalog,
            log,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }

    pub fn is_cached(&self, pid: PageId) -> bool {
        self.pages.lock().contains_key(&pid)
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns page pid once tid holds it in the requested mode, reading it from its table file
    /// on a miss. Blocks while another transaction holds a conflicting lock.
    /// A lock newly granted by this call is released again if the page cannot be loaded.
    pub fn fetch(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> Result<PageRef> {
        let newly_locked = !self.locks.holds(tid, pid);
        self.locks.acquire(tid, pid, mode)?;

        match self.load(pid) {
            Ok(page) => Ok(page),
            Err(err) => {
                if newly_locked {
                    self.locks.release(tid, pid);
                }
                Err(err)
            }
        }
    }

    /// Returns the cached copy of pid, reading it in on a miss. The caller holds a lock on pid.
    fn load(&self, pid: PageId) -> Result<PageRef> {
        if let Some(page) = self.pages.lock().get(&pid) {
            return Ok(page.clone());
        }

        let page = self.catalog.file(pid.table_id)?.read_page(pid)?;
        let mut pages = self.pages.lock();
        // Another holder of a shared lock may have loaded the same page meanwhile.
        if let Some(cached) = pages.get(&pid) {
            return Ok(cached.clone());
        }
        if pages.len() >= self.capacity {
            self.evict(&mut pages)?;
        }
        let page = page.into_ref();
        pages.insert(pid, page.clone());
        Ok(page)
    }

    /// Inserts or replaces the cache entries for pages a table file reports as dirtied.
    pub fn apply_mutations(&self, dirtied: Vec<PageRef>) -> Result<()> {
        for page in dirtied {
            let pid = page.read().id();
            let mut pages = self.pages.lock();
            if !pages.contains_key(&pid) && pages.len() >= self.capacity {
                self.evict(&mut pages)?;
            }
            pages.insert(pid, page);
        }
        Ok(())
    }

    /// Inserts tuple into table on behalf of tid.
    pub fn insert_tuple(&self, tid: TransactionId, table: TableID, tuple: &Tuple) -> Result<()> {
        let file = self.catalog.file(table)?;
        let dirtied = file.insert_tuple(tid, tuple, self)?;
        self.apply_mutations(dirtied)
    }

    /// Deletes tuple, located by its record id, on behalf of tid.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple.record_id()
            .ok_or_else(|| Error::Value(format!("Tuple {} has no record id", tuple)))?;
        let file = self.catalog.file(rid.page_id.table_id)?;
        let dirtied = file.delete_tuple(tid, tuple, self)?;
        self.apply_mutations(dirtied)
    }

    /// Commits tid: every page it dirtied is logged, forced, and written to its table file, then
    /// all its locks are released. If a write fails the transaction is aborted and the error
    /// returned; pages already written stay written.
    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        if let Err(err) = self.flush_pages(tid) {
            warn!("{} failed to flush at commit, aborting: {}", tid, err);
            self.abort(tid);
            return Err(err);
        }
        self.locks.release_all(tid);
        debug!("{} committed", tid);
        Ok(())
    }

    /// Aborts tid: drops every page it dirtied without writing it, then releases its locks.
    pub fn abort(&self, tid: TransactionId) {
        let mut discarded = 0;
        self.pages.lock().retain(|_, page| {
            let keep = page.read().dirtier() != Some(tid);
            if !keep {
                discarded += 1;
            }
            keep
        });
        self.locks.release_all(tid);
        debug!("{} aborted, discarded {} pages", tid, discarded);
    }

    /// Writes every page dirtied by tid to its table file.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        for page in self.dirty_pages(Some(tid)) {
            self.flush_page(&page)?;
        }
        Ok(())
    }

    /// Writes every dirty page to its table file. Breaks the no-steal guarantee for running
    /// transactions, so only use it at a quiescent shutdown.
    pub fn flush_all(&self) -> Result<()> {
        for page in self.dirty_pages(None) {
            self.flush_page(&page)?;
        }
        Ok(())
    }

    /// Drops pid from the cache, dirty or not.
    pub fn discard(&self, pid: PageId) {
        self.pages.lock().remove(&pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.locks.holds(tid, pid)
    }

    /// Releases tid's lock on pid before the transaction ends. Only safe for pages tid read and
    /// did not modify.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.locks.release(tid, pid);
    }

    /// Pages dirtied by tid, or by anyone if tid is None.
    fn dirty_pages(&self, tid: Option<TransactionId>) -> Vec<PageRef> {
        self.pages
            .lock()
            .values()
            .filter(|page| match (page.read().dirtier(), tid) {
                (Some(dirtier), Some(tid)) => dirtier == tid,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .cloned()
            .collect()
    }

    /// Logs and writes a dirty page, then marks it clean with its contents as the new before-image.
    fn flush_page(&self, page: &PageRef) -> Result<()> {
        let mut page = page.write();
        let tid = match page.dirtier() {
            Some(tid) => tid,
            None => return Ok(()),
        };
        let pid = page.id();
        self.log.log_write(tid, pid, page.before_image(), page.data())?;
        self.log.force()?;
        self.catalog.file(pid.table_id)?.write_page(&page)?;
        page.mark_dirty(None);
        page.set_before_image();
        debug!("{} flushed page {}", tid, pid);
        Ok(())
    }

    /// Drops one clean page that no transaction holds a lock on.
    fn evict(&self, pages: &mut HashMap<PageId, PageRef>) -> Result<()> {
        let victim = pages
            .iter()
            .find(|(pid, page)| {
                let clean = page.try_read().map(|p| !p.is_dirty()).unwrap_or(false);
                clean && !self.locks.is_locked(**pid)
            })
            .map(|(pid, _)| *pid);
        match victim {
            Some(pid) => {
                pages.remove(&pid);
                debug!("Evicted page {}", pid);
                Ok(())
            }
            None => Err(Error::CacheExhausted(self.capacity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::log::MemoryLog;
    use crate::storage::page::{HeapPage, Page};
    use crate::storage::tuple::{TupleDesc, Type};
    use crate::storage::{DbFile, HeapFile};
    use tempfile::{tempdir, TempDir};

    const PAGE_SIZE: usize = 64;

    struct Setup {
        _dir: TempDir,
        pool: BufferPool,
        file: Arc<HeapFile>,
        log: Arc<MemoryLog>,
    }

    /// A pool over a single-int table with `pages` empty pages on disk.
    fn setup(capacity: usize, pages: u32) -> Result<Setup> {
        let dir = tempdir()?;
        let file = Arc::new(HeapFile::open(dir.path().join("t.dat"), TupleDesc::from_types(&[Type::Int]), PAGE_SIZE)?);
        for page_no in 0..pages {
            file.write_page(&Page::empty(PageId::new(file.id(), page_no), PAGE_SIZE))?;
        }
        let catalog = Arc::new(Catalog::new());
        catalog.add_table(file.clone(), "t")?;
        let log = Arc::new(MemoryLog::new());
        let pool = BufferPool::new(capacity, catalog, log.clone(), Duration::from_millis(100));
        Ok(Setup { _dir: dir, pool, file, log })
    }

    #[test]
    fn test_fetch_reuses_cached_page() -> Result<()> {
        let s = setup(4, 1)?;
        let tid = TransactionId::new();
        let pid = PageId::new(s.file.id(), 0);

        let a = s.pool.fetch(tid, pid, LockMode::Shared)?;
        let b = s.pool.fetch(tid, pid, LockMode::Exclusive)?;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(1, s.pool.len());
        assert!(s.pool.holds_lock(tid, pid));
        assert_eq!(Some(LockMode::Exclusive), s.pool.lock_manager().mode(tid, pid));

        s.pool.commit(tid)?;
        assert!(!s.pool.holds_lock(tid, pid));
        assert!(s.pool.is_cached(pid));
        Ok(())
    }

    #[test]
    fn test_eviction_skips_locked_pages() -> Result<()> {
        let s = setup(2, 3)?;
        let table = s.file.id();
        let t1 = TransactionId::new();
        s.pool.fetch(t1, PageId::new(table, 0), LockMode::Shared)?;
        s.pool.fetch(t1, PageId::new(table, 1), LockMode::Shared)?;

        let t2 = TransactionId::new();
        assert_eq!(
            Err(Error::CacheExhausted(2)),
            s.pool.fetch(t2, PageId::new(table, 2), LockMode::Shared).map(|_| ())
        );

        s.pool.commit(t1)?;
        s.pool.fetch(t2, PageId::new(table, 2), LockMode::Shared)?;
        assert_eq!(2, s.pool.len());
        assert!(s.pool.is_cached(PageId::new(table, 2)));
        Ok(())
    }

    #[test]
    fn test_dirty_pages_are_never_evicted() -> Result<()> {
        let s = setup(1, 2)?;
        let table = s.file.id();
        let t1 = TransactionId::new();
        s.pool.insert_tuple(t1, table, &Tuple::new(vec![7.into()]))?;
        // Unlocked but still dirty.
        s.pool.release_page(t1, PageId::new(table, 0));

        let t2 = TransactionId::new();
        assert_eq!(
            Err(Error::CacheExhausted(1)),
            s.pool.fetch(t2, PageId::new(table, 1), LockMode::Shared).map(|_| ())
        );
        assert!(s.pool.is_cached(PageId::new(table, 0)));
        Ok(())
    }

    #[test]
    fn test_commit_logs_before_writing() -> Result<()> {
        let s = setup(4, 1)?;
        let table = s.file.id();
        let pid = PageId::new(table, 0);
        let tid = TransactionId::new();
        s.pool.insert_tuple(tid, table, &Tuple::new(vec![42.into()]))?;
        assert!(s.log.records().is_empty());

        s.pool.commit(tid)?;
        let records = s.log.forced_records();
        assert_eq!(1, records.len());
        assert_eq!(tid.id(), records[0].txn);
        assert_eq!(pid, records[0].page);
        assert_eq!(vec![0; PAGE_SIZE], records[0].before);

        let on_disk = s.file.read_page(pid)?;
        assert_eq!(records[0].after, on_disk.data());
        let cached = s.pool.fetch(TransactionId::new(), pid, LockMode::Shared)?;
        let cached = cached.read();
        assert!(!cached.is_dirty());
        assert_eq!(on_disk.data(), cached.before_image());
        Ok(())
    }

    #[test]
    fn test_failed_fetch_releases_new_lock() -> Result<()> {
        let s = setup(4, 0)?;
        let table = s.file.id();
        let pid = PageId::new(table, 0);

        let t1 = TransactionId::new();
        assert!(matches!(s.pool.fetch(t1, pid, LockMode::Shared), Err(Error::Value(_))));
        assert!(!s.pool.holds_lock(t1, pid));
        assert!(!s.pool.lock_manager().is_locked(pid));

        // Appending page 0 must not wait on t1.
        let t2 = TransactionId::new();
        s.pool.insert_tuple(t2, table, &Tuple::new(vec![3.into()]))?;
        assert_eq!(1, s.file.num_pages()?);
        s.pool.commit(t2)?;
        Ok(())
    }

    #[test]
    fn test_failed_fetch_keeps_earlier_lock() -> Result<()> {
        let s = setup(1, 2)?;
        let table = s.file.id();
        let t1 = TransactionId::new();
        s.pool.fetch(t1, PageId::new(table, 0), LockMode::Shared)?;

        let t2 = TransactionId::new();
        let pid = PageId::new(table, 1);
        s.pool.lock_manager().acquire(t2, pid, LockMode::Shared)?;
        assert_eq!(
            Err(Error::CacheExhausted(1)),
            s.pool.fetch(t2, pid, LockMode::Shared).map(|_| ())
        );
        assert!(s.pool.holds_lock(t2, pid));
        Ok(())
    }

    /// Dirties page_no on behalf of tid by writing value into it.
    fn dirty(s: &Setup, tid: TransactionId, page_no: u32, value: i32) -> Result<()> {
        let page = s.pool.fetch(tid, PageId::new(s.file.id(), page_no), LockMode::Exclusive)?;
        let mut page = page.write();
        let desc = s.file.tuple_desc().clone();
        HeapPage::open_mut(&mut page, &desc).insert_tuple(&Tuple::new(vec![value.into()]))?;
        page.mark_dirty(Some(tid));
        Ok(())
    }

    #[test]
    fn test_flush_all_writes_every_dirty_page() -> Result<()> {
        let s = setup(4, 2)?;
        let table = s.file.id();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        dirty(&s, t1, 0, 10)?;
        dirty(&s, t2, 1, 20)?;

        s.pool.flush_all()?;

        let records = s.log.forced_records();
        assert_eq!(2, records.len());
        for (tid, page_no) in [(t1, 0), (t2, 1)] {
            let pid = PageId::new(table, page_no);
            let record = records
                .iter()
                .find(|r| r.page == pid)
                .ok_or_else(|| Error::Internal(format!("no log record for {}", pid)))?;
            assert_eq!(tid.id(), record.txn);

            let on_disk = s.file.read_page(pid)?;
            assert_eq!(record.after, on_disk.data());
            let cached = s.pool.fetch(tid, pid, LockMode::Shared)?;
            let cached = cached.read();
            assert!(!cached.is_dirty());
            assert_eq!(on_disk.data(), cached.data());
            assert_eq!(on_disk.data(), cached.before_image());
        }

        // Nothing is left to flush.
        s.pool.flush_all()?;
        assert_eq!(2, s.log.records().len());
        Ok(())
    }

    #[test]
    fn test_abort_discards_dirty_pages() -> Result<()> {
        let s = setup(4, 1)?;
        let table = s.file.id();
        let pid = PageId::new(table, 0);
        let tid = TransactionId::new();
        s.pool.insert_tuple(tid, table, &Tuple::new(vec![1.into()]))?;
        assert!(s.pool.is_cached(pid));

        s.pool.abort(tid);
        assert!(!s.pool.is_cached(pid));
        assert!(s.pool.lock_manager().pages_held(tid).is_empty());
        assert!(s.log.records().is_empty());

        let page = s.pool.fetch(TransactionId::new(), pid, LockMode::Shared)?;
        let page = page.read();
        let desc = s.file.tuple_desc().clone();
        assert_eq!(0, HeapPage::open(&page, &desc).tuples()?.len());
        Ok(())
    }
}
