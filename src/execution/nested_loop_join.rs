use crate::buffer::BufferManager;
use crate::catalog::TableSchema;
use crate::error::GranaryResult;
use crate::execution::{JoinBase, JoinOperator, JoinStats};
use crate::storage::disk::HeapFile;
use crate::storage::tuple::Value;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Block nested-loop join. The left (outer) relation is consumed in blocks
/// of up to `M − 2` pinned pages; the right (inner) relation is streamed
/// once per block through a single frame. Neither side needs to fit in
/// memory; the I/O cost is `O(|L| + ⌈|L|/(M−2)⌉·|R|)`.
pub struct NestedLoopJoinOperator {
    base: JoinBase,
}

impl NestedLoopJoinOperator {
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

impl JoinOperator for NestedLoopJoinOperator {
    fn execute(
        &mut self,
        num_available_buf_pages: usize,
        result_file: &Arc<HeapFile>,
    ) -> GranaryResult<bool> {
        if self.base.complete {
            return Ok(true);
        }
        self.base.begin_run(num_available_buf_pages)?;
        let block_capacity = num_available_buf_pages - 2;

        let left_file = self.base.left_file.clone();
        let right_file = self.base.right_file.clone();
        let left_schema = self.base.left_schema.clone();
        let right_schema = self.base.right_schema.clone();

        let left_page_ids = left_file.page_ids();
        let mut next_block_start = 0;
        while next_block_start < left_page_ids.len() {
            let block_end = (next_block_start + block_capacity).min(left_page_ids.len());
            debug!(
                "nested loop block of left pages {:?}",
                &left_page_ids[next_block_start..block_end]
            );

            // Load the block: its pages stay pinned while the inner relation
            // streams past, and its tuples are hashed by join key.
            let mut block_table: HashMap<Vec<u8>, Vec<Vec<Value>>> = HashMap::new();
            let mut block_guards = Vec::with_capacity(block_end - next_block_start);
            for &page_id in &left_page_ids[next_block_start..block_end] {
                let (guard, page) = self.base.read_page(&left_file, page_id)?;
                for (_, values) in self.base.page_values(&page, &left_schema)? {
                    let key = self.base.left_key(&values)?;
                    block_table.entry(key).or_default().push(values);
                }
                block_guards.push(guard);
            }

            // Stream the inner relation against the block.
            for page_id in right_file.page_ids() {
                let (_guard, page) = self.base.read_page(&right_file, page_id)?;
                for (_, right_values) in self.base.page_values(&page, &right_schema)? {
                    let key = self.base.right_key(&right_values)?;
                    let Some(matches) = block_table.get(&key) else {
                        continue;
                    };
                    for left_values in matches {
                        self.base.emit(left_values, &right_values, result_file)?;
                    }
                }
                // right guard drops clean after each page
            }

            drop(block_guards);
            // release the inner relation's frames before the next block
            self.base.buffer.flush_file(&right_file)?;
            next_block_start = block_end;
        }

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
