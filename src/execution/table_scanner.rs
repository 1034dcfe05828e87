use crate::buffer::BufferManager;
use crate::catalog::TableSchema;
use crate::error::GranaryResult;
use crate::storage::codec::HeapPageCodec;
use crate::storage::disk::HeapFile;
use crate::storage::tuple::{TupleCodec, Value};
use comfy_table::Cell;
use std::sync::Arc;

/// Pretty-prints the rows of a heap file against a schema.
pub struct TableScanner {
    file: Arc<HeapFile>,
    schema: TableSchema,
    buffer: Arc<BufferManager>,
}

impl TableScanner {
    pub fn new(file: Arc<HeapFile>, schema: TableSchema, buffer: Arc<BufferManager>) -> Self {
        Self {
            file,
            schema,
            buffer,
        }
    }

    /// Decodes every live tuple in page order. Flushes the file first so the
    /// scan reflects all buffered writes (and fails loudly on a pin leak).
    pub fn rows(&self) -> GranaryResult<Vec<Vec<Value>>> {
        self.buffer.flush_file(&self.file)?;
        let mut rows = Vec::new();
        for page_id in self.file.page_ids() {
            let guard = self.buffer.read_page(&self.file, page_id)?;
            let page = HeapPageCodec::decode(&*guard.read(), page_id)?;
            for (_, record) in page.iter() {
                rows.push(TupleCodec::decode(&self.schema, record)?);
            }
        }
        Ok(rows)
    }

    pub fn print(&self) -> GranaryResult<()> {
        let rows = self.rows()?;
        let mut table = comfy_table::Table::new();
        table.load_preset("||--+-++|    ++++++");
        let header: Vec<Cell> = self
            .schema
            .attributes
            .iter()
            .map(|attr| Cell::new(attr.name.clone()))
            .collect();
        table.set_header(header);
        for row in &rows {
            let cells: Vec<Cell> = row.iter().map(|value| Cell::new(value.to_string())).collect();
            table.add_row(cells);
        }
        println!("Table: {}", self.schema.name);
        println!("{table}");
        Ok(())
    }
}
