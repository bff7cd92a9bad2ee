use std::sync::Arc;

use log::debug;

use crate::buffer::BufferPool;
use crate::common::TableID;
use crate::concurrency::TransactionId;
use crate::error::{Error, Result};
use crate::storage::tuple::{Field, Tuple, TupleDesc, Type};
use crate::storage::DbIterator;
use super::OpIterator;

fn count_desc() -> TupleDesc {
    TupleDesc::new(&[Type::Int], &["count"])
}

/// Inserts every tuple of its child into a table, then yields one tuple holding the count.
pub struct Insert {
    tid: TransactionId,
    table: TableID,
    pool: Arc<BufferPool>,
    child: OpIterator,
    desc: TupleDesc,
    open: bool,
    done: bool,
}

impl Insert {
    /// Fails with SchemaMismatch if the child's tuples do not fit the table.
    pub fn new(tid: TransactionId, child: OpIterator, table: TableID, pool: Arc<BufferPool>) -> Result<Self> {
        let table_desc = pool.catalog().tuple_desc(table)?;
        if *child.tuple_desc() != table_desc {
            return Err(Error::SchemaMismatch(format!(
                "Cannot insert ({}) into table {} of ({})", child.tuple_desc(), table, table_desc
            )));
        }
        Ok(Self { tid, table, pool, child, desc: count_desc(), open: false, done: false })
    }
}

impl DbIterator for Insert {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.open = true;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.open {
            return Err(Error::Value("Insert is not open".into()));
        }
        if self.done {
            return Ok(None);
        }
        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            self.pool.insert_tuple(self.tid, self.table, &tuple)?;
            count += 1;
        }
        self.done = true;
        debug!("{} inserted {} tuples into table {}", self.tid, count, self.table);
        Ok(Some(Tuple::new(vec![Field::Int(count)])))
    }

    fn close(&mut self) {
        self.child.close();
        self.open = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

/// Deletes every tuple its child yields, located by record id, then yields the count.
pub struct Delete {
    tid: TransactionId,
    pool: Arc<BufferPool>,
    child: OpIterator,
    desc: TupleDesc,
    open: bool,
    done: bool,
}

impl Delete {
    pub fn new(tid: TransactionId, child: OpIterator, pool: Arc<BufferPool>) -> Self {
        Self { tid, pool, child, desc: count_desc(), open: false, done: false }
    }
}

impl DbIterator for Delete {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.open = true;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.open {
            return Err(Error::Value("Delete is not open".into()));
        }
        if self.done {
            return Ok(None);
        }
        let mut count = 0;
        while let Some(tuple) = self.child.next()? {
            self.pool.delete_tuple(self.tid, &tuple)?;
            count += 1;
        }
        self.done = true;
        debug!("{} deleted {} tuples", self.tid, count);
        Ok(Some(Tuple::new(vec![Field::Int(count)])))
    }

    fn close(&mut self) {
        self.child.close();
        self.open = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
