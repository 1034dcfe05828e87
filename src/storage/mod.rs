pub mod codec;
pub mod disk;
pub mod heap;
pub mod page;
pub mod tuple;

pub use disk::{FileId, HeapFile};
pub use heap::HeapFileManager;
pub use page::{HeapPage, PageId, RecordId, SlotId, INVALID_PAGE_ID, PAGE_SIZE};
pub use tuple::{TupleCodec, Value};
