use crate::error::{GranaryError, GranaryResult};
use crate::storage::page::{PageId, INVALID_PAGE_ID, PAGE_SIZE};
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub type FileId = u64;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

static EMPTY_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

/// A heap file: an ordered sequence of fixed-size pages on disk. Page `n`
/// lives at byte offset `(n - 1) * PAGE_SIZE`; page number 0 is reserved.
///
/// Deleted pages are zeroed in place and recycled through an in-memory free
/// list; after reopening a file they read back as empty pages.
#[derive(Debug)]
pub struct HeapFile {
    id: FileId,
    path: PathBuf,
    file: Mutex<File>,
    next_page_id: AtomicU32,
    free_pages: Mutex<BTreeSet<PageId>>,
}

impl HeapFile {
    /// Creates a new, empty heap file. Fails if the path already exists.
    pub fn create(path: impl AsRef<Path>) -> GranaryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    GranaryError::Storage(format!("file {} already exists", path.display()))
                } else {
                    e.into()
                }
            })?;
        Ok(Self::from_parts(path, file, 1))
    }

    /// Opens an existing heap file, recovering the page count from its length.
    pub fn open(path: impl AsRef<Path>) -> GranaryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    GranaryError::FileNotFound(path.display().to_string())
                } else {
                    e.into()
                }
            })?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(GranaryError::Internal(format!(
                "file {} size {} is not a multiple of the page size {}",
                path.display(),
                len,
                PAGE_SIZE
            )));
        }
        let next_page_id = (len / PAGE_SIZE as u64 + 1) as PageId;
        Ok(Self::from_parts(path, file, next_page_id))
    }

    /// Removes a heap file from disk.
    pub fn remove(path: impl AsRef<Path>) -> GranaryResult<()> {
        let path = path.as_ref();
        std::fs::remove_file(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                GranaryError::FileNotFound(path.display().to_string())
            } else {
                e.into()
            }
        })
    }

    fn from_parts(path: PathBuf, file: File, next_page_id: PageId) -> Self {
        let id = NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            "opened heap file {} (id {}, next page {})",
            path.display(),
            id,
            next_page_id
        );
        Self {
            id,
            path,
            file: Mutex::new(file),
            next_page_id: AtomicU32::new(next_page_id),
            free_pages: Mutex::new(BTreeSet::new()),
        }
    }

    /// Process-unique identity; half of the buffer manager's residency key.
    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocates a zeroed page, reusing the lowest freed page number first.
    pub fn allocate_page(&self) -> GranaryResult<PageId> {
        let recycled = self.free_pages.lock().pop_first();
        let page_id = match recycled {
            Some(page_id) => page_id,
            None => self.next_page_id.fetch_add(1, Ordering::SeqCst),
        };
        self.write_page(page_id, &EMPTY_PAGE)?;
        Ok(page_id)
    }

    pub fn read_page(&self, page_id: PageId) -> GranaryResult<[u8; PAGE_SIZE]> {
        self.check_page_id(page_id, "read_page")?;
        let mut guard = self.file.lock();
        guard.seek(SeekFrom::Start(
            (page_id - 1) as u64 * PAGE_SIZE as u64,
        ))?;
        let mut page = [0u8; PAGE_SIZE];
        guard.read_exact(&mut page)?;
        Ok(page)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> GranaryResult<()> {
        self.check_page_id(page_id, "write_page")?;
        if data.len() != PAGE_SIZE {
            return Err(GranaryError::Internal(format!(
                "page data is {} bytes, expected {}",
                data.len(),
                PAGE_SIZE
            )));
        }
        let mut guard = self.file.lock();
        guard.seek(SeekFrom::Start(
            (page_id - 1) as u64 * PAGE_SIZE as u64,
        ))?;
        guard.write_all(data)?;
        guard.flush()?;
        Ok(())
    }

    /// Zeroes the page on disk and returns its number to the free list.
    pub fn delete_page(&self, page_id: PageId) -> GranaryResult<()> {
        self.check_page_id(page_id, "delete_page")?;
        self.write_page(page_id, &EMPTY_PAGE)?;
        self.free_pages.lock().insert(page_id);
        Ok(())
    }

    /// Live page numbers in ascending order.
    pub fn page_ids(&self) -> Vec<PageId> {
        let next = self.next_page_id.load(Ordering::SeqCst);
        let free = self.free_pages.lock();
        (1..next).filter(|id| !free.contains(id)).collect()
    }

    pub fn page_count(&self) -> usize {
        self.page_ids().len()
    }

    fn check_page_id(&self, page_id: PageId, op: &str) -> GranaryResult<()> {
        if page_id == INVALID_PAGE_ID
            || page_id >= self.next_page_id.load(Ordering::SeqCst)
        {
            return Err(GranaryError::Storage(format!(
                "{}: page {} is not allocated in {}",
                op,
                page_id,
                self.path.display()
            )));
        }
        Ok(())
    }
}
