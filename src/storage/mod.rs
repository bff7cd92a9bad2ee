pub mod catalog;
pub mod disk;
pub mod log;
pub mod page;
pub mod tuple;

use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::{PageId, TableID};
use crate::concurrency::{LockMode, TransactionId};
use crate::error::Result;
use self::page::{Page, PageRef};
use self::tuple::{Tuple, TupleDesc};

pub use catalog::Catalog;
pub use disk::heap_file::HeapFile;

/// The backing store of one table: a sequence of fixed-size pages.
pub trait DbFile: Send + Sync {
    /// Unique id of the table stored in this file.
    fn id(&self) -> TableID;

    fn tuple_desc(&self) -> &TupleDesc;

    fn page_size(&self) -> usize;

    /// Reads one page straight from the file.
    fn read_page(&self, pid: PageId) -> Result<Page>;

    /// Writes one page straight to the file.
    fn write_page(&self, page: &Page) -> Result<()>;

    /// Number of pages in the file.
    fn num_pages(&self) -> Result<usize>;

    /// Inserts tuple on behalf of tid, locking pages through pool. Returns the pages it dirtied.
    fn insert_tuple(&self, tid: TransactionId, tuple: &Tuple, pool: &BufferPool) -> Result<Vec<PageRef>>;

    /// Deletes the tuple at the tuple's record id. Returns the pages it dirtied.
    fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple, pool: &BufferPool) -> Result<Vec<PageRef>>;

    /// A lazy scan over every tuple, fetching each page through pool in the given mode.
    fn scan(self: Arc<Self>, tid: TransactionId, pool: Arc<BufferPool>, mode: LockMode) -> Box<dyn DbIterator + Send>;
}

/// A forward-only, restartable sequence of tuples. open and close bracket resource use.
pub trait DbIterator {
    fn open(&mut self) -> Result<()>;

    /// Returns the next tuple, or None once exhausted.
    fn next(&mut self) -> Result<Option<Tuple>>;

    fn close(&mut self);

    fn rewind(&mut self) -> Result<()> {
        self.close();
        self.open()
    }

    fn tuple_desc(&self) -> &TupleDesc;

    /// Drains the remaining tuples into a vector.
    fn collect_all(&mut self) -> Result<Vec<Tuple>> {
        let mut tuples = Vec::new();
        while let Some(tuple) = self.next()? {
            tuples.push(tuple);
        }
        Ok(tuples)
    }
}
