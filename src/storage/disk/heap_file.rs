use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::vec;

use log::debug;
use parking_lot::Mutex;

use crate::buffer::BufferPool;
use crate::common::{PageId, TableID};
use crate::concurrency::{LockMode, TransactionId};
use crate::error::{Error, Result};
use crate::storage::page::{HeapPage, Page, PageRef};
use crate::storage::tuple::{Tuple, TupleDesc};
use crate::storage::{DbFile, DbIterator};

/// An unordered collection of tuples stored in fixed-size pages. Page k lives at byte offset
/// k * page_size of the file.
pub struct HeapFile {
    id: TableID,
    path: PathBuf,
    file: Mutex<File>,
    desc: TupleDesc,
    page_size: usize,
    /// Serializes choosing and writing the next page number.
    append: Mutex<()>,
}

impl HeapFile {
    /// Opens the heap file at path, creating an empty one if it does not exist. The table id is
    /// derived from the absolute path.
    pub fn open(path: impl AsRef<Path>, desc: TupleDesc, page_size: usize) -> Result<Self> {
        if desc.size() == 0 || desc.size() * 8 + 1 > page_size * 8 {
            return Err(Error::Value(format!("Tuples of ({}) do not fit in {} byte pages", desc, page_size)));
        }
        let file = OpenOptions::new().read(true).write(true).create(true).open(path.as_ref())?;
        let path = std::fs::canonicalize(path.as_ref())?;

        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let id = hasher.finish() as TableID;

        debug!("Opened heap file {} as table {}", path.display(), id);
        Ok(Self { id, path, file: Mutex::new(file), desc, page_size, append: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_page(&self, pid: PageId) -> Result<()> {
        if pid.table_id != self.id {
            return Err(Error::Value(format!("Page {} does not belong to table {}", pid, self.id)));
        }
        Ok(())
    }

    /// Extends the file by one empty page, locked exclusively for tid, and fetches it.
    fn append_page(&self, tid: TransactionId, pool: &BufferPool) -> Result<PageRef> {
        let pid = {
            let _append = self.append.lock();
            let pid = PageId::new(self.id, self.num_pages()? as u32);
            // Nobody can know the page number yet, so the lock is granted without waiting.
            pool.lock_manager().acquire(tid, pid, LockMode::Exclusive)?;
            self.write_page(&Page::empty(pid, self.page_size))?;
            pid
        };
        debug!("{} appended page {}", tid, pid);
        pool.fetch(tid, pid, LockMode::Exclusive)
    }

    /// Inserts into page if it has a free slot and marks it dirty. Returns false if it is full.
    fn insert_into(&self, tid: TransactionId, page: &PageRef, tuple: &Tuple) -> Result<bool> {
        let mut page = page.write();
        let mut heap = HeapPage::open_mut(&mut page, &self.desc);
        if heap.num_empty_slots() == 0 {
            return Ok(false);
        }
        heap.insert_tuple(tuple)?;
        page.mark_dirty(Some(tid));
        Ok(true)
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> TableID {
        self.id
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_page(&self, pid: PageId) -> Result<Page> {
        self.check_page(pid)?;
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        let offset = pid.offset(self.page_size);
        if offset + self.page_size as u64 > len {
            return Err(Error::Value(format!("Page {} is past the end of {}", pid, self.path.display())));
        }
        let mut data = vec![0; self.page_size];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut data)?;
        Ok(Page::new(pid, data))
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        self.check_page(page.id())?;
        if page.data().len() != self.page_size {
            return Err(Error::Internal(format!(
                "Page {} holds {} bytes, expected {}", page.id(), page.data().len(), self.page_size
            )));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page.id().offset(self.page_size)))?;
        file.write_all(page.data())?;
        file.flush()?;
        Ok(())
    }

    fn num_pages(&self) -> Result<usize> {
        let len = self.file.lock().metadata()?.len();
        Ok((len / self.page_size as u64) as usize)
    }

    fn insert_tuple(&self, tid: TransactionId, tuple: &Tuple, pool: &BufferPool) -> Result<Vec<PageRef>> {
        if !tuple.matches(&self.desc) {
            return Err(Error::SchemaMismatch(format!("Tuple {} does not match ({})", tuple, self.desc)));
        }
        for page_no in 0..self.num_pages()? {
            let page = pool.fetch(tid, PageId::new(self.id, page_no as u32), LockMode::Exclusive)?;
            if self.insert_into(tid, &page, tuple)? {
                return Ok(vec![page]);
            }
        }

        let page = self.append_page(tid, pool)?;
        if !self.insert_into(tid, &page, tuple)? {
            return Err(Error::Internal(format!("Freshly appended page {} is full", page.read().id())));
        }
        Ok(vec![page])
    }

    fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple, pool: &BufferPool) -> Result<Vec<PageRef>> {
        let rid = tuple.record_id()
            .ok_or_else(|| Error::Value(format!("Tuple {} has no record id", tuple)))?;
        self.check_page(rid.page_id)?;
        if rid.page_id.page_no as usize >= self.num_pages()? {
            return Err(Error::Value(format!("Page {} does not exist", rid.page_id)));
        }

        let page = pool.fetch(tid, rid.page_id, LockMode::Exclusive)?;
        {
            let mut guard = page.write();
            HeapPage::open_mut(&mut guard, &self.desc).delete_tuple(rid)?;
            guard.mark_dirty(Some(tid));
        }
        Ok(vec![page])
    }

    fn scan(self: Arc<Self>, tid: TransactionId, pool: Arc<BufferPool>, mode: LockMode) -> Box<dyn DbIterator + Send> {
        Box::new(HeapFileIterator::new(self, pool, tid, mode))
    }
}

enum ScanState {
    Closed,
    Open { next_page: u32, tuples: vec::IntoIter<Tuple> },
}

/// Scans a heap file page by page, fetching every page through the buffer pool.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    mode: LockMode,
    state: ScanState,
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, tid: TransactionId, mode: LockMode) -> Self {
        Self { file, pool, tid, mode, state: ScanState::Closed }
    }
}

impl DbIterator for HeapFileIterator {
    fn open(&mut self) -> Result<()> {
        self.state = ScanState::Open { next_page: 0, tuples: Vec::new().into_iter() };
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        let (next_page, tuples) = match &mut self.state {
            ScanState::Closed => return Err(Error::Value("Scan is not open".into())),
            ScanState::Open { next_page, tuples } => (next_page, tuples),
        };
        loop {
            if let Some(tuple) = tuples.next() {
                return Ok(Some(tuple));
            }
            if *next_page as usize >= self.file.num_pages()? {
                return Ok(None);
            }
            let page = self.pool.fetch(self.tid, PageId::new(self.file.id(), *next_page), self.mode)?;
            *next_page += 1;
            let page = page.read();
            *tuples = HeapPage::open(&page, &self.file.desc).tuples()?.into_iter();
        }
    }

    fn close(&mut self) {
        self.state = ScanState::Closed;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.file.desc
    }
}
