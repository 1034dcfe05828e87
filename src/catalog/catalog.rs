use crate::catalog::TableSchema;
use crate::error::{GranaryError, GranaryResult};
use std::collections::HashMap;

pub type TableId = u32;

#[derive(Debug)]
pub struct CatalogTable {
    pub schema: TableSchema,
    pub filename: String,
}

/// In-memory mapping `table id ↔ table name ↔ filename ↔ schema`. The
/// catalog never touches pages; files are opened by whoever consumes the
/// filename.
#[derive(Debug)]
pub struct Catalog {
    pub name: String,
    tables: HashMap<TableId, CatalogTable>,
    ids_by_name: HashMap<String, TableId>,
    next_table_id: TableId,
}

impl Catalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: HashMap::new(),
            ids_by_name: HashMap::new(),
            next_table_id: 1,
        }
    }

    pub fn add_table_schema(
        &mut self,
        schema: TableSchema,
        filename: impl Into<String>,
    ) -> GranaryResult<TableId> {
        let key = schema.name.to_ascii_lowercase();
        if self.ids_by_name.contains_key(&key) {
            return Err(GranaryError::Storage(format!(
                "table {} already exists in catalog {}",
                schema.name, self.name
            )));
        }
        let table_id = self.next_table_id;
        self.next_table_id += 1;
        self.ids_by_name.insert(key, table_id);
        self.tables.insert(
            table_id,
            CatalogTable {
                schema,
                filename: filename.into(),
            },
        );
        Ok(table_id)
    }

    pub fn table_id(&self, name: &str) -> GranaryResult<TableId> {
        self.ids_by_name
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| {
                GranaryError::Storage(format!(
                    "table {} does not exist in catalog {}",
                    name, self.name
                ))
            })
    }

    pub fn table_filename(&self, table_id: TableId) -> GranaryResult<&str> {
        self.table(table_id).map(|t| t.filename.as_str())
    }

    pub fn table_schema(&self, table_id: TableId) -> GranaryResult<&TableSchema> {
        self.table(table_id).map(|t| &t.schema)
    }

    fn table(&self, table_id: TableId) -> GranaryResult<&CatalogTable> {
        self.tables.get(&table_id).ok_or_else(|| {
            GranaryError::Storage(format!(
                "table id {} does not exist in catalog {}",
                table_id, self.name
            ))
        })
    }
}
