//! # HPP SQLite
//!
//! 以 SQLite 實作的交易儲存

mod codec;
pub mod db;
pub mod error;
pub mod schema;
pub mod store;

// Re-export 主要類型
pub use db::{open_connection, WRITE_LOCK_WAIT_MS};
pub use store::{SqliteStore, SqliteUnitOfWork};
