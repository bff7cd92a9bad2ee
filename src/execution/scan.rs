use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::TableID;
use crate::concurrency::{LockMode, TransactionId};
use crate::error::Result;
use crate::storage::tuple::{TdItem, Tuple, TupleDesc};
use crate::storage::DbIterator;
use super::OpIterator;

/// Sequential scan of one table. With an alias, field names are reported as `alias.name`.
pub struct SeqScan {
    table: TableID,
    alias: Option<String>,
    desc: TupleDesc,
    inner: OpIterator,
}

impl SeqScan {
    /// Scans table on behalf of tid, locking each page in mode as it is reached.
    pub fn new(
        tid: TransactionId,
        table: TableID,
        alias: Option<&str>,
        pool: Arc<BufferPool>,
        mode: LockMode,
    ) -> Result<Self> {
        let file = pool.catalog().file(table)?;
        let desc = match alias {
            Some(alias) => TupleDesc::from_items(
                file.tuple_desc()
                    .items()
                    .iter()
                    .map(|item| TdItem {
                        field_type: item.field_type,
                        name: item.name.as_ref().map(|name| format!("{}.{}", alias, name)),
                    })
                    .collect(),
            ),
            None => file.tuple_desc().clone(),
        };
        let inner = file.scan(tid, pool, mode);
        Ok(Self { table, alias: alias.map(String::from), desc, inner })
    }

    pub fn table(&self) -> TableID {
        self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

impl DbIterator for SeqScan {
    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        self.inner.next()
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
