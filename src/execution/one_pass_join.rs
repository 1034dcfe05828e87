use crate::buffer::{BufferManager, PageGuard};
use crate::catalog::TableSchema;
use crate::error::{GranaryError, GranaryResult};
use crate::execution::{JoinBase, JoinOperator, JoinStats};
use crate::storage::disk::HeapFile;
use crate::storage::page::{HeapPage, PageId, RecordId};
use crate::storage::tuple::TupleCodec;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// One-pass hash join. The right relation must fit in the operator's buffer
/// budget: its pages stay pinned from the build phase until the probe phase
/// is done, with one frame reserved for the current left page and one for
/// the result heap.
pub struct OnePassJoinOperator {
    base: JoinBase,
}

impl OnePassJoinOperator {
    pub fn new(
        left_file: Arc<HeapFile>,
        right_file: Arc<HeapFile>,
        left_schema: TableSchema,
        right_schema: TableSchema,
        buffer: Arc<BufferManager>,
    ) -> Self {
        Self {
            base: JoinBase::new(left_file, right_file, left_schema, right_schema, buffer),
        }
    }
}

impl JoinOperator for OnePassJoinOperator {
    fn execute(
        &mut self,
        num_available_buf_pages: usize,
        result_file: &Arc<HeapFile>,
    ) -> GranaryResult<bool> {
        if self.base.complete {
            return Ok(true);
        }
        self.base.begin_run(num_available_buf_pages)?;
        let right_budget = num_available_buf_pages - 2;

        let left_file = self.base.left_file.clone();
        let right_file = self.base.right_file.clone();
        let right_schema = self.base.right_schema.clone();
        let left_schema = self.base.left_schema.clone();

        // Build: hash every right tuple by its join key, keeping the pages
        // pinned so the probe phase can fetch matches without further I/O.
        let mut table: HashMap<Vec<u8>, Vec<RecordId>> = HashMap::new();
        let mut resident: HashMap<PageId, (PageGuard, HeapPage)> = HashMap::new();
        for page_id in right_file.page_ids() {
            if resident.len() == right_budget {
                debug!(
                    "right relation {} exceeds {} build frames",
                    right_file.path().display(),
                    right_budget
                );
                return Err(GranaryError::BufferExceeded(num_available_buf_pages));
            }
            let (guard, page) = self.base.read_page(&right_file, page_id)?;
            for (slot_id, values) in self.base.page_values(&page, &right_schema)? {
                let key = self.base.right_key(&values)?;
                table
                    .entry(key)
                    .or_default()
                    .push(RecordId::new(page_id, slot_id));
            }
            resident.insert(page_id, (guard, page));
        }

        // Probe: one left page pinned at a time.
        for page_id in left_file.page_ids() {
            let (_guard, page) = self.base.read_page(&left_file, page_id)?;
            for (_, left_values) in self.base.page_values(&page, &left_schema)? {
                let key = self.base.left_key(&left_values)?;
                let Some(matches) = table.get(&key) else {
                    continue;
                };
                for rid in matches {
                    let (_, right_page) = &resident[&rid.page_id];
                    let record = right_page.record(rid.slot_id)?;
                    let right_values = TupleCodec::decode(&right_schema, &record)?;
                    self.base.emit(&left_values, &right_values, result_file)?;
                }
            }
            // left guard drops clean here
        }

        // release the retained right pins
        drop(resident);

        self.base.finish_run();
        Ok(true)
    }

    fn is_complete(&self) -> bool {
        self.base.complete
    }

    fn stats(&self) -> &JoinStats {
        &self.base.stats
    }
}
