use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::PageId;
use crate::concurrency::TransactionId;

/// A live page shared between the buffer pool and the transactions holding a lock on it.
pub type PageRef = Arc<RwLock<Page>>;

/// A fixed-size page of a table file.
#[derive(Clone, Debug)]
pub struct Page {
    id: PageId,
    data: Vec<u8>,
    /// The transaction whose uncommitted writes the page holds, if any.
    dirtier: Option<TransactionId>,
    /// Contents as last persisted, kept for the write-ahead log.
    before_image: Vec<u8>,
}

impl Page {
    pub fn new(id: PageId, data: Vec<u8>) -> Self {
        let before_image = data.clone();
        Self { id, data, dirtier: None, before_image }
    }

    /// A zero-filled page.
    pub fn empty(id: PageId, page_size: usize) -> Self {
        Self::new(id, vec![0; page_size])
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    /// Marks the page dirty on behalf of tid, or clean with None.
    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Makes the current contents the new before-image. Called once they are persisted.
    pub fn set_before_image(&mut self) {
        self.before_image.clear();
        self.before_image.extend_from_slice(&self.data);
    }

    pub fn into_ref(self) -> PageRef {
        Arc::new(RwLock::new(self))
    }
}
