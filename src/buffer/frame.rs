use crate::storage::disk::{FileId, HeapFile};
use crate::storage::page::{PageId, INVALID_PAGE_ID};
use std::sync::Arc;

pub type FrameId = usize;

/// Residency key: a page is identified by the file it belongs to plus its
/// page number within that file.
pub type FrameKey = (FileId, PageId);

/// Book-keeping for one buffer frame.
///
/// Invariants: `valid` implies a file and a real page number are set;
/// `pin_count > 0`, `dirty` and `refbit` all imply `valid`.
#[derive(Debug, Clone)]
pub struct FrameDesc {
    pub frame_id: FrameId,
    pub file: Option<Arc<HeapFile>>,
    pub page_id: PageId,
    pub valid: bool,
    pub dirty: bool,
    pub refbit: bool,
    pub pin_count: u32,
}

impl FrameDesc {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            file: None,
            page_id: INVALID_PAGE_ID,
            valid: false,
            dirty: false,
            refbit: false,
            pin_count: 0,
        }
    }

    /// Resets the descriptor to the invalid state.
    pub fn clear(&mut self) {
        self.file = None;
        self.page_id = INVALID_PAGE_ID;
        self.valid = false;
        self.dirty = false;
        self.refbit = false;
        self.pin_count = 0;
    }

    /// Seats a newly loaded page: valid, pinned once, recently referenced,
    /// clean.
    pub fn set(&mut self, file: Arc<HeapFile>, page_id: PageId) {
        self.file = Some(file);
        self.page_id = page_id;
        self.valid = true;
        self.dirty = false;
        self.refbit = true;
        self.pin_count = 1;
    }

    pub fn key(&self) -> Option<FrameKey> {
        self.file.as_ref().map(|file| (file.id(), self.page_id))
    }

    pub fn belongs_to(&self, file_id: FileId) -> bool {
        self.file.as_ref().map_or(false, |file| file.id() == file_id)
    }
}
