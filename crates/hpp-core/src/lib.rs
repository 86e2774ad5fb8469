//! # HPP Core
//!
//! 生產成本核算（HPP）的核心資料模型、錯誤類型與儲存介面

pub mod clock;
pub mod composition;
pub mod config;
pub mod finished_goods;
pub mod material;
pub mod production;
pub mod store;

// Re-export 主要類型
pub use clock::{Clock, FixedClock, SystemClock};
pub use composition::{Composition, CompositionMaterial};
pub use config::CostingConfig;
pub use finished_goods::{AggregateInventory, ProductStockBatch, StockSource};
pub use material::MaterialStockBatch;
pub use production::{ProductionBatch, ProductionMaterialUsage, ProductionStatus};
pub use store::{Store, UnitOfWork};

use rust_decimal::Decimal;
use uuid::Uuid;

/// HPP 錯誤類型
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HppError {
    #[error(
        "庫存不足: 物料 {material_id} 於倉庫 {warehouse_id} 需要 {required}, 可用 {available}, 短缺 {missing}"
    )]
    InsufficientStock {
        material_id: String,
        warehouse_id: String,
        required: Decimal,
        available: Decimal,
        missing: Decimal,
    },

    #[error("找不到可用配方: 租戶 {tenant_id} 產品 {product_id}")]
    CompositionNotFound {
        tenant_id: String,
        product_id: String,
    },

    #[error("生產批次已完工: {batch_code} ({batch_id})")]
    AlreadyCompleted { batch_id: Uuid, batch_code: String },

    #[error("找不到 {entity}: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("無效的數量 {field}: {value}")]
    InvalidQuantity { field: &'static str, value: Decimal },

    #[error("批號重複: {0}")]
    DuplicateBatchCode(String),

    #[error("批號產生失敗：已嘗試 {attempts} 次")]
    BatchCodeExhausted { attempts: u32 },

    #[error("無效的配置: {0}")]
    InvalidConfig(String),

    #[error("計算錯誤: {0}")]
    Calculation(String),

    #[error("儲存層錯誤: {0}")]
    Store(String),
}

impl HppError {
    /// 建立 NotFound 錯誤
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HppError>;
