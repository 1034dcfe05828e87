mod buffer_manager;
mod frame;

pub use buffer_manager::{BufferManager, PageGuard};
pub use frame::{FrameDesc, FrameId, FrameKey};
