//! # HPP Store
//!
//! 記憶體交易儲存：一次一個 unit of work，未提交即以 undo log 回滾

pub mod dirty_tracking;
pub mod memory;

// Re-export 主要類型
pub use dirty_tracking::{DirtyTracker, RecordKind};
pub use memory::{MemoryStore, MemoryUnitOfWork};
