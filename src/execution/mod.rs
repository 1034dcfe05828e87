mod grace_hash_join;
mod nested_loop_join;
mod one_pass_join;
mod table_scanner;

pub use grace_hash_join::GraceHashJoinOperator;
pub use nested_loop_join::NestedLoopJoinOperator;
pub use one_pass_join::OnePassJoinOperator;
pub use table_scanner::TableScanner;

use crate::buffer::{BufferManager, FrameKey, PageGuard};
use crate::catalog::TableSchema;
use crate::error::{GranaryError, GranaryResult};
use crate::storage::codec::HeapPageCodec;
use crate::storage::disk::HeapFile;
use crate::storage::heap::HeapFileManager;
use crate::storage::page::{HeapPage, PageId, SlotId};
use crate::storage::tuple::{TupleCodec, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Counters reset at the start of every `execute` and exposed afterwards.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinStats {
    pub num_result_tuples: usize,
    pub num_used_buf_pages: usize,
    pub num_ios: usize,
}

/// A natural-join executor over two heap files.
///
/// `execute` pins at most `num_available_buf_pages` frames concurrently and
/// appends the joined tuples to `result_file`. Completion is absorbing: a
/// second call is a no-op returning `true` and preserves the counters.
pub trait JoinOperator {
    fn execute(
        &mut self,
        num_available_buf_pages: usize,
        result_file: &Arc<HeapFile>,
    ) -> GranaryResult<bool>;

    fn is_complete(&self) -> bool;

    fn stats(&self) -> &JoinStats;

    fn print_running_stats(&self) {
        let stats = self.stats();
        println!("# Result Tuples: {}", stats.num_result_tuples);
        println!("# Used Buffer Pages: {}", stats.num_used_buf_pages);
        println!("# I/Os: {}", stats.num_ios);
    }
}

/// State shared by the three operators: input files and schemas, the derived
/// natural-join output schema, the key ordinals on both sides, and the
/// running counters.
pub(crate) struct JoinBase {
    pub left_file: Arc<HeapFile>,
    pub right_file: Arc<HeapFile>,
    pub left_schema: TableSchema,
    pub right_schema: TableSchema,
    pub result_schema: TableSchema,
    pub buffer: Arc<BufferManager>,
    pub stats: JoinStats,
    pub complete: bool,
    left_key_ordinals: Vec<usize>,
    right_key_ordinals: Vec<usize>,
    /// Right attributes that are appended to the output.
    right_extra_ordinals: Vec<usize>,
    /// Pages this operator has pinned at least once during the current run.
    seen_pages: HashSet<FrameKey>,
}

impl JoinBase {
    pub fn new(
        left_file: Arc<HeapFile>,
        right_file: Arc<HeapFile>,
        left_schema: TableSchema,
        right_schema: TableSchema,
        buffer: Arc<BufferManager>,
    ) -> Self {
        let common = left_schema.common_attributes(&right_schema);
        let left_key_ordinals: Vec<usize> = common.iter().map(|&(left, _)| left).collect();
        let right_key_ordinals: Vec<usize> = common.iter().map(|&(_, right)| right).collect();
        let right_extra_ordinals: Vec<usize> = (0..right_schema.attr_count())
            .filter(|idx| !right_key_ordinals.contains(idx))
            .collect();
        let result_schema = left_schema.natural_join(&right_schema);
        Self {
            left_file,
            right_file,
            left_schema,
            right_schema,
            result_schema,
            buffer,
            stats: JoinStats::default(),
            complete: false,
            left_key_ordinals,
            right_key_ordinals,
            right_extra_ordinals,
            seen_pages: HashSet::new(),
        }
    }

    pub fn begin_run(&mut self, num_available_buf_pages: usize) -> GranaryResult<()> {
        if num_available_buf_pages < 3 {
            return Err(GranaryError::Execution(format!(
                "join operators need at least 3 buffer pages, got {}",
                num_available_buf_pages
            )));
        }
        self.stats = JoinStats::default();
        self.seen_pages.clear();
        Ok(())
    }

    /// Pins and decodes one page, bumping the I/O counter and, on the first
    /// pin of this page by this operator, the used-pages counter.
    pub fn read_page(
        &mut self,
        file: &Arc<HeapFile>,
        page_id: PageId,
    ) -> GranaryResult<(PageGuard, HeapPage)> {
        let guard = self.buffer.read_page(file, page_id)?;
        self.stats.num_ios += 1;
        if self.seen_pages.insert((file.id(), page_id)) {
            self.stats.num_used_buf_pages += 1;
        }
        let page = HeapPageCodec::decode(&*guard.read(), page_id)?;
        Ok((guard, page))
    }

    pub fn page_values(
        &self,
        page: &HeapPage,
        schema: &TableSchema,
    ) -> GranaryResult<Vec<(SlotId, Vec<Value>)>> {
        let mut tuples = Vec::new();
        for (slot_id, record) in page.iter() {
            tuples.push((slot_id, TupleCodec::decode(schema, record)?));
        }
        Ok(tuples)
    }

    pub fn left_key(&self, values: &[Value]) -> GranaryResult<Vec<u8>> {
        TupleCodec::join_key(&self.left_schema, values, &self.left_key_ordinals)
    }

    pub fn right_key(&self, values: &[Value]) -> GranaryResult<Vec<u8>> {
        TupleCodec::join_key(&self.right_schema, values, &self.right_key_ordinals)
    }

    /// Emits one joined tuple: the left tuple followed by the right
    /// attributes that are not part of the join key.
    pub fn emit(
        &mut self,
        left_values: &[Value],
        right_values: &[Value],
        result_file: &Arc<HeapFile>,
    ) -> GranaryResult<()> {
        let mut out = left_values.to_vec();
        for &ordinal in &self.right_extra_ordinals {
            out.push(right_values[ordinal].clone());
        }
        let bytes = TupleCodec::encode(&self.result_schema, &out)?;
        HeapFileManager::insert_tuple(&bytes, result_file, &self.buffer)?;
        self.stats.num_result_tuples += 1;
        Ok(())
    }

    /// The result heap occupies one frame at a time while emitting.
    pub fn finish_run(&mut self) {
        self.stats.num_used_buf_pages += 1;
        self.complete = true;
    }
}
