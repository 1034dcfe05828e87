use crate::buffer::frame::{FrameDesc, FrameId, FrameKey};
use crate::config::BufferPoolConfig;
use crate::error::{GranaryError, GranaryResult};
use crate::storage::disk::HeapFile;
use crate::storage::page::{PageId, PAGE_SIZE};
use dashmap::DashMap;
use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct DescTable {
    descs: Vec<FrameDesc>,
    clock_hand: usize,
}

impl DescTable {
    /// Releases one pin. Unpinning a page that is no longer resident
    /// silently succeeds; callers unpin optimistically on cleanup.
    fn unpin(&mut self, frame_id: FrameId, key: FrameKey, dirty: bool) -> GranaryResult<()> {
        let desc = &mut self.descs[frame_id];
        if !desc.valid || desc.key() != Some(key) {
            return Ok(());
        }
        if desc.pin_count == 0 {
            return Err(GranaryError::PageNotPinned {
                page_id: key.1,
                frame_id,
            });
        }
        desc.pin_count -= 1;
        if dirty {
            desc.dirty = true;
        }
        Ok(())
    }
}

/// A fixed pool of page frames fronting any number of heap files, with CLOCK
/// replacement and pin-based eviction protection. Pages are handed out as
/// [`PageGuard`]s; dropping the guard unpins the frame.
#[derive(Debug)]
pub struct BufferManager {
    num_frames: usize,
    pool: Vec<Arc<RwLock<[u8; PAGE_SIZE]>>>,
    state: Arc<Mutex<DescTable>>,
    page_table: Arc<DashMap<FrameKey, FrameId>>,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

impl BufferManager {
    pub fn new(num_frames: usize) -> Self {
        assert!(num_frames > 0, "buffer pool must have at least one frame");
        let pool = (0..num_frames)
            .map(|_| Arc::new(RwLock::new([0u8; PAGE_SIZE])))
            .collect();
        let descs = (0..num_frames).map(FrameDesc::new).collect();
        Self {
            num_frames,
            pool,
            state: Arc::new(Mutex::new(DescTable {
                descs,
                // first advance lands on frame 0
                clock_hand: num_frames - 1,
            })),
            page_table: Arc::new(DashMap::new()),
            disk_reads: AtomicU64::new(0),
            disk_writes: AtomicU64::new(0),
        }
    }

    pub fn with_config(config: BufferPoolConfig) -> Self {
        Self::new(config.buffer_pool_size)
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Pages read from disk so far.
    pub fn disk_reads(&self) -> u64 {
        self.disk_reads.load(Ordering::Relaxed)
    }

    /// Pages written back to disk so far.
    pub fn disk_writes(&self) -> u64 {
        self.disk_writes.load(Ordering::Relaxed)
    }

    /// Pins the page, loading it from disk on a residency miss.
    pub fn read_page(&self, file: &Arc<HeapFile>, page_id: PageId) -> GranaryResult<PageGuard> {
        let key = (file.id(), page_id);
        let mut state = self.state.lock();
        if let Some(frame_id) = self.page_table.get(&key).map(|entry| *entry.value()) {
            let desc = &mut state.descs[frame_id];
            desc.refbit = true;
            desc.pin_count += 1;
            return Ok(self.guard(frame_id, key));
        }

        let frame_id = self.alloc_frame(&mut state)?;
        let data = file.read_page(page_id)?;
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
        self.pool[frame_id].write().copy_from_slice(&data);
        self.page_table.insert(key, frame_id);
        state.descs[frame_id].set(file.clone(), page_id);
        Ok(self.guard(frame_id, key))
    }

    /// Allocates a fresh page on disk and seats it pinned and dirty.
    pub fn alloc_page(&self, file: &Arc<HeapFile>) -> GranaryResult<(PageId, PageGuard)> {
        let page_id = file.allocate_page()?;
        let key = (file.id(), page_id);
        let mut state = self.state.lock();
        let frame_id = self.alloc_frame(&mut state)?;
        self.pool[frame_id].write().fill(0);
        self.page_table.insert(key, frame_id);
        let desc = &mut state.descs[frame_id];
        desc.set(file.clone(), page_id);
        desc.dirty = true;
        Ok((page_id, self.guard(frame_id, key)))
    }

    /// Drops the page from the pool (if resident) and deletes it from the
    /// file. A page that is not resident is not an error.
    pub fn dispose_page(&self, file: &Arc<HeapFile>, page_id: PageId) -> GranaryResult<()> {
        let key = (file.id(), page_id);
        {
            let mut state = self.state.lock();
            if let Some((_, frame_id)) = self.page_table.remove(&key) {
                state.descs[frame_id].clear();
            }
        }
        file.delete_page(page_id)
    }

    /// Writes back every dirty frame of `file` and evicts all of its frames
    /// from the pool. Fails loudly on a frame that is still pinned, which is
    /// how pin leaks surface in tests.
    pub fn flush_file(&self, file: &HeapFile) -> GranaryResult<()> {
        let mut state = self.state.lock();
        for frame_id in 0..self.num_frames {
            let desc = &state.descs[frame_id];
            if !desc.belongs_to(file.id()) {
                continue;
            }
            if desc.pin_count != 0 {
                return Err(GranaryError::PagePinned {
                    page_id: desc.page_id,
                    frame_id,
                });
            }
            if !desc.valid {
                return Err(GranaryError::BadBuffer { frame_id });
            }
            let page_id = desc.page_id;
            if desc.dirty {
                let data = self.pool[frame_id].read();
                file.write_page(page_id, &*data)?;
                drop(data);
                self.disk_writes.fetch_add(1, Ordering::Relaxed);
            }
            self.page_table.remove(&(file.id(), page_id));
            state.descs[frame_id].clear();
        }
        Ok(())
    }

    /// CLOCK replacement. Advances the hand one step before inspecting, so
    /// two successive calls never hand out the same frame.
    fn alloc_frame(&self, state: &mut DescTable) -> GranaryResult<FrameId> {
        let mut pinned_seen = 0usize;
        loop {
            state.clock_hand = (state.clock_hand + 1) % self.num_frames;
            let hand = state.clock_hand;

            if !state.descs[hand].valid {
                state.descs[hand].clear();
                return Ok(hand);
            }
            if state.descs[hand].refbit {
                state.descs[hand].refbit = false;
                // this frame may become the victim next lap
                pinned_seen = 0;
                continue;
            }
            if state.descs[hand].pin_count > 0 {
                pinned_seen += 1;
                if pinned_seen == self.num_frames {
                    return Err(GranaryError::BufferExceeded(self.num_frames));
                }
                continue;
            }

            // victim found: write back if dirty, drop the residency entry
            let desc = &state.descs[hand];
            if desc.dirty {
                let file = desc.file.clone().ok_or(GranaryError::BadBuffer {
                    frame_id: hand,
                })?;
                let data = self.pool[hand].read();
                file.write_page(desc.page_id, &*data)?;
                self.disk_writes.fetch_add(1, Ordering::Relaxed);
            }
            if let Some(key) = desc.key() {
                debug!("evicting page {} of file {} from frame {}", key.1, key.0, hand);
                self.page_table.remove(&key);
            }
            state.descs[hand].clear();
            return Ok(hand);
        }
    }

    fn guard(&self, frame_id: FrameId, key: FrameKey) -> PageGuard {
        PageGuard {
            frame: self.pool[frame_id].clone(),
            frame_id,
            key,
            state: self.state.clone(),
        }
    }

    #[cfg(test)]
    fn pin_count(&self, file: &HeapFile, page_id: PageId) -> Option<u32> {
        let key = (file.id(), page_id);
        let frame_id = self.page_table.get(&key).map(|entry| *entry.value())?;
        Some(self.state.lock().descs[frame_id].pin_count)
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        let state = self.state.lock();
        for desc in state.descs.iter() {
            if !(desc.valid && desc.dirty) {
                continue;
            }
            let Some(file) = &desc.file else { continue };
            let data = self.pool[desc.frame_id].read();
            if let Err(e) = file.write_page(desc.page_id, &*data) {
                warn!(
                    "failed to write back page {} of file {} on shutdown: {}",
                    desc.page_id,
                    file.path().display(),
                    e
                );
            }
        }
    }
}

/// A pinned page. The pin is released when the guard is dropped; call
/// [`PageGuard::mark_dirty`] after mutating the frame so eviction and
/// `flush_file` write the change back.
#[derive(Debug)]
pub struct PageGuard {
    frame: Arc<RwLock<[u8; PAGE_SIZE]>>,
    frame_id: FrameId,
    key: FrameKey,
    state: Arc<Mutex<DescTable>>,
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.key.1
    }

    pub fn read(&self) -> RwLockReadGuard<'_, [u8; PAGE_SIZE]> {
        self.frame.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, [u8; PAGE_SIZE]> {
        self.frame.write()
    }

    /// Marks the frame dirty. Sticky until the page is flushed or evicted.
    pub fn mark_dirty(&self) {
        let mut state = self.state.lock();
        let desc = &mut state.descs[self.frame_id];
        if desc.valid && desc.key() == Some(self.key) {
            desc.dirty = true;
        }
    }

    /// Explicit release, optionally marking the frame dirty first.
    pub fn unpin(self, dirty: bool) {
        if dirty {
            self.mark_dirty();
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Err(e) = state.unpin(self.frame_id, self.key, false) {
            error!("failed to unpin page {}: {}", self.key.1, e);
        }
    }
}
