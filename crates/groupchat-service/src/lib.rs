mod http;
#[cfg(feature = "test-helpers")]
pub mod memory;
mod traits;

pub use http::HttpService;
#[cfg(feature = "test-helpers")]
pub use memory::MemoryService;
pub use traits::{AttachmentBytes, GroupDirectory, MessageStore, ServiceError};
