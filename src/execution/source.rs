use crate::error::{Error, Result};
use crate::storage::tuple::{Tuple, TupleDesc};
use crate::storage::DbIterator;

/// Iterates over a fixed, in-memory list of tuples.
pub struct TupleList {
    desc: TupleDesc,
    tuples: Vec<Tuple>,
    cursor: Option<usize>,
}

impl TupleList {
    pub fn new(desc: TupleDesc, tuples: Vec<Tuple>) -> Self {
        Self { desc, tuples, cursor: None }
    }
}

impl DbIterator for TupleList {
    fn open(&mut self) -> Result<()> {
        self.cursor = Some(0);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        let cursor = self.cursor.as_mut().ok_or_else(|| Error::Value("Tuple list is not open".into()))?;
        let tuple = self.tuples.get(*cursor).cloned();
        if tuple.is_some() {
            *cursor += 1;
        }
        Ok(tuple)
    }

    fn close(&mut self) {
        self.cursor = None;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tuple::Type;

    #[test]
    fn test_rewind() -> Result<()> {
        let tuples = vec![Tuple::new(vec![1.into()]), Tuple::new(vec![2.into()])];
        let mut list = TupleList::new(TupleDesc::from_types(&[Type::Int]), tuples.clone());
        assert!(list.next().is_err());

        list.open()?;
        assert_eq!(tuples, list.collect_all()?);
        assert_eq!(None, list.next()?);
        list.rewind()?;
        assert_eq!(Some(tuples[0].clone()), list.next()?);
        list.close();
        assert!(list.next().is_err());
        Ok(())
    }
}
