use crate::buffer::BufferManager;
use crate::catalog::TableSchema;
use crate::error::{GranaryError, GranaryResult};
use crate::execution::{JoinBase, JoinOperator, JoinStats, OnePassJoinOperator};
use crate::storage::disk::HeapFile;
use crate::storage::heap::HeapFileManager;
use crate::storage::tuple::Value;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

/// Grace hash join: partition both sides into `B = M − 1` buckets with the
/// same byte hash over the join key, then run a one-pass join per bucket.
/// Partition files are ordinary heap files written through the buffer
/// manager and removed before `execute` returns successfully. A skewed
/// bucket that does not fit the inner one-pass budget surfaces
/// `BufferExceeded`.
pub struct GraceHashJoinOperator {
    base: JoinBase,
}

impl GraceHashJoinOperator {
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

    fn bucket(key: &[u8], num_buckets: usize) -> usize {
        crc32fast::hash(key) as usize % num_buckets
    }

    /// Creates the spill files for one side, replacing leftovers from an
    /// earlier failed run.
    fn create_partitions(
        source: &HeapFile,
        side: &str,
        num_buckets: usize,
    ) -> GranaryResult<Vec<Arc<HeapFile>>> {
        let mut partitions = Vec::with_capacity(num_buckets);
        for bucket in 0..num_buckets {
            let path = Self::partition_path(source, side, bucket);
            match HeapFile::remove(&path) {
                Ok(()) | Err(GranaryError::FileNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            partitions.push(Arc::new(HeapFile::create(&path)?));
        }
        Ok(partitions)
    }

    fn partition_path(source: &HeapFile, side: &str, bucket: usize) -> PathBuf {
        let mut path = source.path().as_os_str().to_owned();
        path.push(format!(".{side}{bucket}"));
        PathBuf::from(path)
    }

    /// Hashes every tuple of `file` into its bucket's spill file. The tuple
    /// bytes are appended verbatim.
    fn partition_side(
        &mut self,
        file: &Arc<HeapFile>,
        schema: &TableSchema,
        key_of: impl Fn(&JoinBase, &[Value]) -> GranaryResult<Vec<u8>>,
        partitions: &[Arc<HeapFile>],
    ) -> GranaryResult<()> {
        let buffer = self.base.buffer.clone();
        for page_id in file.page_ids() {
            let (_guard, page) = self.base.read_page(file, page_id)?;
            for (slot_id, values) in self.base.page_values(&page, schema)? {
                let key = key_of(&self.base, &values)?;
                let bucket = Self::bucket(&key, partitions.len());
                let record = page.record(slot_id)?;
                HeapFileManager::insert_tuple(&record, &partitions[bucket], &buffer)?;
            }
        }
        Ok(())
    }

    fn cleanup(&self, partitions: &[Arc<HeapFile>]) -> GranaryResult<()> {
        for partition in partitions {
            self.base.buffer.flush_file(partition)?;
            match HeapFile::remove(partition.path()) {
                Ok(()) | Err(GranaryError::FileNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl JoinOperator for GraceHashJoinOperator {
    fn execute(
        &mut self,
        num_available_buf_pages: usize,
        result_file: &Arc<HeapFile>,
    ) -> GranaryResult<bool> {
        if self.base.complete {
            return Ok(true);
        }
        self.base.begin_run(num_available_buf_pages)?;
        let num_buckets = num_available_buf_pages - 1;

        let left_file = self.base.left_file.clone();
        let right_file = self.base.right_file.clone();
        let left_schema = self.base.left_schema.clone();
        let right_schema = self.base.right_schema.clone();

        let left_partitions = Self::create_partitions(&left_file, "l", num_buckets)?;
        let right_partitions = Self::create_partitions(&right_file, "r", num_buckets)?;

        self.partition_side(&left_file, &left_schema, JoinBase::left_key, &left_partitions)?;
        self.partition_side(
            &right_file,
            &right_schema,
            JoinBase::right_key,
            &right_partitions,
        )?;

        // make the spills durable and give their frames back to the pool
        for partition in left_partitions.iter().chain(&right_partitions) {
            self.base.buffer.flush_file(partition)?;
        }

        for bucket in 0..num_buckets {
            debug!(
                "grace bucket {}: {} left pages, {} right pages",
                bucket,
                left_partitions[bucket].page_count(),
                right_partitions[bucket].page_count()
            );
            let mut bucket_join = OnePassJoinOperator::new(
                left_partitions[bucket].clone(),
                right_partitions[bucket].clone(),
                left_schema.renamed(format!("{}_l{}", left_schema.name, bucket)),
                right_schema.renamed(format!("{}_r{}", right_schema.name, bucket)),
                self.base.buffer.clone(),
            );
            bucket_join.execute(num_available_buf_pages, result_file)?;
            let inner = bucket_join.stats();
            self.base.stats.num_result_tuples += inner.num_result_tuples;
            self.base.stats.num_used_buf_pages += inner.num_used_buf_pages;
            self.base.stats.num_ios += inner.num_ios;
        }

        self.cleanup(&left_partitions)?;
        self.cleanup(&right_partitions)?;

        self.base.complete = true;
        Ok(true)
    }

    fn is_complete(&self) -> bool {
        self.base.complete
    }

    fn stats(&self) -> &JoinStats {
        &self.base.stats
    }
}
