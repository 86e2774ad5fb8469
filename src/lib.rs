//! # HPP
//!
//! 生產成本（HPP，單位生產成本）核算：FIFO 扣料、成本追溯與成品入庫。
//!
//! 各子 crate：
//! - [`hpp_core`]：資料模型、錯誤、配置與儲存介面
//! - [`hpp_calc`]：FIFO 扣料、成本計算與生產流程
//! - [`hpp_store`]：記憶體交易儲存
//! - [`hpp_sqlite`]：SQLite 交易儲存

pub use hpp_calc;
pub use hpp_core;
pub use hpp_sqlite;
pub use hpp_store;

pub use hpp_calc::{
    CompleteProduction, ProductionService, ReceiveMaterial, SequentialBatchCodeGenerator,
    StartProduction,
};
pub use hpp_core::{CostingConfig, HppError, Result};
