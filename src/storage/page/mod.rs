pub mod heap_page;
pub mod page;

pub use heap_page::HeapPage;
pub use page::{Page, PageRef};
