use crate::buffer::FrameId;
use crate::storage::page::PageId;
use thiserror::Error;

pub type GranaryResult<T, E = GranaryError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum GranaryError {
    /// A full CLOCK sweep found every frame pinned.
    #[error("Buffer exceeded: all {0} frames are pinned")]
    BufferExceeded(usize),

    #[error("Page {page_id} in frame {frame_id} is still pinned")]
    PagePinned { page_id: PageId, frame_id: FrameId },

    #[error("Page {page_id} in frame {frame_id} is not pinned")]
    PageNotPinned { page_id: PageId, frame_id: FrameId },

    #[error("Frame {frame_id} is tagged with a file but holds no valid page")]
    BadBuffer { frame_id: FrameId },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Not support: {0}")]
    NotSupport(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parser error: {0}")]
    Parser(#[from] sqlparser::parser::ParserError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Execution error: {0}")]
    Execution(String),
}
