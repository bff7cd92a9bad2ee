pub mod rid;

use std::fmt::Display;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

pub use rid::RecordId;

pub type TableID = u32;   // table id type
pub type PageNo = u32;    // page number within a table file

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_BUFFER_PAGES: usize = 50;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Identifies a fixed-size page within the whole engine. Used as the cache and lock-table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableID,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(table_id: TableID, page_no: PageNo) -> Self {
        Self { table_id, page_no }
    }

    /// Byte offset of this page within its table file.
    pub fn offset(&self, page_size: usize) -> u64 {
        self.page_no as u64 * page_size as u64
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}
