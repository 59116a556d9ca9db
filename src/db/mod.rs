pub mod entities;
pub mod enums;
pub mod memory_store;
pub mod operation_log_service;
pub mod store;

pub use memory_store::MemoryStore;
pub use store::{Store, StoreError};
