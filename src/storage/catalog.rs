use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;

use crate::common::TableID;
use crate::error::{Error, Result};
use super::tuple::TupleDesc;
use super::DbFile;

struct Table {
    name: String,
    file: Arc<dyn DbFile>,
}

/// Maps table ids and names to their backing files.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<TableID, Table>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers file under name, replacing any table previously registered under that name.
    ///
    /// Fails if the file's id already belongs to a table with a different name. Table ids are
    /// hashes of file paths, so two distinct files can in principle collide.
    pub fn add_table(&self, file: Arc<dyn DbFile>, name: &str) -> Result<TableID> {
        let id = file.id();
        let mut tables = self.tables.write();
        if let Some(existing) = tables.get(&id) {
            if existing.name != name {
                return Err(Error::Value(format!(
                    "Table id {} for {} is already registered as {}",
                    id, name, existing.name
                )));
            }
        }
        tables.retain(|_, t| t.name != name);
        tables.insert(id, Table { name: name.to_string(), file });
        info!("Registered table {} with id {}", name, id);
        Ok(id)
    }

    pub fn file(&self, id: TableID) -> Result<Arc<dyn DbFile>> {
        self.tables
            .read()
            .get(&id)
            .map(|t| t.file.clone())
            .ok_or_else(|| Error::Value(format!("Unknown table id {}", id)))
    }

    pub fn tuple_desc(&self, id: TableID) -> Result<TupleDesc> {
        Ok(self.file(id)?.tuple_desc().clone())
    }

    pub fn table_id(&self, name: &str) -> Result<TableID> {
        self.tables
            .read()
            .iter()
            .find(|(_, t)| t.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| Error::Value(format!("Unknown table {}", name)))
    }

    pub fn table_name(&self, id: TableID) -> Result<String> {
        self.tables
            .read()
            .get(&id)
            .map(|t| t.name.clone())
            .ok_or_else(|| Error::Value(format!("Unknown table id {}", id)))
    }

    pub fn table_ids(&self) -> Vec<TableID> {
        let mut ids: Vec<TableID> = self.tables.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tuple::Type;
    use crate::storage::HeapFile;
    use tempfile::tempdir;

    #[test]
    fn test_lookup() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let desc = TupleDesc::new(&[Type::Int], &["a"]);
        let a = Arc::new(HeapFile::open(dir.path().join("a.dat"), desc.clone(), 64)?);
        let b = Arc::new(HeapFile::open(dir.path().join("b.dat"), desc.clone(), 64)?);

        let a_id = catalog.add_table(a, "a")?;
        let b_id = catalog.add_table(b.clone(), "b")?;
        assert_ne!(a_id, b_id);
        assert_eq!(a_id, catalog.table_id("a")?);
        assert_eq!("b", catalog.table_name(b_id)?);
        assert_eq!(desc, catalog.tuple_desc(a_id)?);
        assert!(matches!(catalog.table_id("missing"), Err(Error::Value(_))));

        // Re-registering a name replaces the previous table.
        let c = Arc::new(HeapFile::open(dir.path().join("c.dat"), desc.clone(), 64)?);
        let c_id = catalog.add_table(c, "a")?;
        assert_eq!(c_id, catalog.table_id("a")?);
        assert!(matches!(catalog.file(a_id), Err(Error::Value(_))));
        let mut ids = vec![b_id, c_id];
        ids.sort();
        assert_eq!(ids, catalog.table_ids());
        Ok(())
    }

    #[test]
    fn test_id_taken_by_another_name() -> Result<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let desc = TupleDesc::new(&[Type::Int], &["a"]);
        let path = dir.path().join("a.dat");
        let first = Arc::new(HeapFile::open(&path, desc.clone(), 64)?);
        let again = Arc::new(HeapFile::open(&path, desc, 64)?);
        let id = catalog.add_table(first, "a")?;

        // Scenario: a second file with the same id is registered under a new name.
        assert!(matches!(catalog.add_table(again.clone(), "b"), Err(Error::Value(_))));
        assert_eq!(id, catalog.table_id("a")?);
        assert!(matches!(catalog.table_id("b"), Err(Error::Value(_))));
        assert_eq!(vec![id], catalog.table_ids());

        // The same name may be registered again.
        assert_eq!(id, catalog.add_table(again, "a")?);
        assert_eq!(vec![id], catalog.table_ids());
        Ok(())
    }
}
