//! 成品庫存模型

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::HppError;

/// 成品批次來源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockSource {
    /// 生產完工
    Production,
}

impl StockSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockSource::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for StockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockSource {
    type Err = HppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRODUCTION" => Ok(StockSource::Production),
            other => Err(HppError::Store(format!("未知的庫存來源: {}", other))),
        }
    }
}

/// 成品庫存批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStockBatch {
    /// 批次ID
    pub id: Uuid,

    /// 租戶
    pub tenant_id: String,

    /// 產品ID
    pub product_id: String,

    /// 倉庫
    pub warehouse_id: String,

    /// 批號
    pub batch_code: String,

    /// 來源
    pub source: StockSource,

    /// 來源單據（生產批次ID）
    pub reference_id: Uuid,

    /// 入庫總量
    pub qty_total: Decimal,

    /// 剩餘數量
    pub qty_remaining: Decimal,

    /// 單位成本（= 生產批次 HPP）
    pub cost_per_unit: Decimal,

    /// 入庫時間
    pub received_at: DateTime<Utc>,
}

impl ProductStockBatch {
    /// 由完工的生產批次建立成品批次
    pub fn from_production(
        production: &crate::ProductionBatch,
        warehouse_id: String,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: production.tenant_id.clone(),
            product_id: production.product_id.clone(),
            warehouse_id,
            batch_code: production.batch_code.clone(),
            source: StockSource::Production,
            reference_id: production.id,
            qty_total: production.produced_qty,
            qty_remaining: production.produced_qty,
            cost_per_unit: production.hpp_per_unit,
            received_at,
        }
    }
}

/// 彙總庫存（產品 × 倉庫 × 儲位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateInventory {
    /// 記錄ID
    pub id: Uuid,

    /// 租戶
    pub tenant_id: String,

    /// 產品ID
    pub product_id: String,

    /// 倉庫
    pub warehouse_id: String,

    /// 儲位
    pub shelf_id: String,

    /// 現有數量
    pub quantity: Decimal,

    /// 最後異動時間
    pub updated_at: DateTime<Utc>,
}

impl AggregateInventory {
    pub fn new(
        tenant_id: String,
        product_id: String,
        warehouse_id: String,
        shelf_id: String,
        quantity: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            product_id,
            warehouse_id,
            shelf_id,
            quantity,
            updated_at,
        }
    }
}
