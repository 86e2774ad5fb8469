//! 生產批次模型

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::HppError;

/// 生產批次狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionStatus {
    /// 生產中（開工後）
    InProgress,
    /// 已完工（終態）
    Completed,
}

impl ProductionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionStatus::InProgress => "IN_PROGRESS",
            ProductionStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductionStatus {
    type Err = HppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(ProductionStatus::InProgress),
            "COMPLETED" => Ok(ProductionStatus::Completed),
            other => Err(HppError::Store(format!("未知的生產狀態: {}", other))),
        }
    }
}

/// 生產批次（一次製造）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionBatch {
    /// 批次ID
    pub id: Uuid,

    /// 租戶
    pub tenant_id: String,

    /// 批號（唯一）
    pub batch_code: String,

    /// 產品ID
    pub product_id: String,

    /// 計劃產量
    pub planned_qty: Decimal,

    /// 實際產量（完工前為 0）
    pub produced_qty: Decimal,

    /// 狀態
    pub status: ProductionStatus,

    /// 開工時間
    pub started_at: DateTime<Utc>,

    /// 完工時間
    pub completed_at: Option<DateTime<Utc>>,

    /// 物料總成本（開工時固定）
    pub total_material_cost: Decimal,

    /// 製造費用（完工時設定）
    pub overhead_cost: Decimal,

    /// 總成本（完工前為暫估值 = 物料成本）
    pub total_cost: Decimal,

    /// 單位生產成本（完工前為 0）
    pub hpp_per_unit: Decimal,
}

impl ProductionBatch {
    /// 開工：建立生產中的批次
    pub fn start(
        tenant_id: String,
        batch_code: String,
        product_id: String,
        planned_qty: Decimal,
        total_material_cost: Decimal,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            batch_code,
            product_id,
            planned_qty,
            produced_qty: Decimal::ZERO,
            status: ProductionStatus::InProgress,
            started_at,
            completed_at: None,
            total_material_cost,
            overhead_cost: Decimal::ZERO,
            total_cost: total_material_cost,
            hpp_per_unit: Decimal::ZERO,
        }
    }

    /// 是否已完工
    pub fn is_completed(&self) -> bool {
        self.status == ProductionStatus::Completed
    }

    /// 確認批次仍在生產中，否則回傳 AlreadyCompleted
    pub fn ensure_in_progress(&self) -> crate::Result<()> {
        match self.status {
            ProductionStatus::InProgress => Ok(()),
            ProductionStatus::Completed => Err(HppError::AlreadyCompleted {
                batch_id: self.id,
                batch_code: self.batch_code.clone(),
            }),
        }
    }

    /// 完工：固定實際產量與成本
    pub fn complete(
        &mut self,
        produced_qty: Decimal,
        overhead_cost: Decimal,
        total_cost: Decimal,
        hpp_per_unit: Decimal,
        completed_at: DateTime<Utc>,
    ) -> crate::Result<()> {
        self.ensure_in_progress()?;

        self.status = ProductionStatus::Completed;
        self.produced_qty = produced_qty;
        self.overhead_cost = overhead_cost;
        self.total_cost = total_cost;
        self.hpp_per_unit = hpp_per_unit;
        self.completed_at = Some(completed_at);
        Ok(())
    }
}

/// 生產物料耗用記錄（每個被扣減的來源批次一筆）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionMaterialUsage {
    /// 記錄ID
    pub id: Uuid,

    /// 生產批次ID
    pub production_batch_id: Uuid,

    /// 來源物料批次ID
    pub material_batch_id: Uuid,

    /// 物料ID
    pub material_id: String,

    /// 耗用數量
    pub qty_used: Decimal,

    /// 耗用時的單位成本
    pub cost_at_usage: Decimal,
}

impl ProductionMaterialUsage {
    pub fn new(
        production_batch_id: Uuid,
        material_batch_id: Uuid,
        material_id: String,
        qty_used: Decimal,
        cost_at_usage: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            production_batch_id,
            material_batch_id,
            material_id,
            qty_used,
            cost_at_usage,
        }
    }

    /// 本筆耗用成本
    pub fn line_cost(&self) -> crate::Result<Decimal> {
        self.qty_used
            .checked_mul(self.cost_at_usage)
            .ok_or_else(|| crate::HppError::Calculation("耗用成本溢位".to_string()))
    }
}
