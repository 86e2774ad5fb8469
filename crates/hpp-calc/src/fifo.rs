//! FIFO 扣料引擎

use chrono::{DateTime, Utc};
use hpp_core::{CostingConfig, HppError, MaterialStockBatch, UnitOfWork};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 單一來源批次的扣料結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageResult {
    /// 來源物料批次ID
    pub batch_id: Uuid,

    /// 來源批號
    pub batch_code: String,

    /// 物料ID
    pub material_id: String,

    /// 扣減數量
    pub qty_used: Decimal,

    /// 扣減時的單位成本
    pub cost_at_usage: Decimal,
}

/// FIFO 扣料計算器
pub struct FifoConsumer;

impl FifoConsumer {
    /// 依入庫先後扣減物料批次
    ///
    /// 每個批次在走訪時立即寫回剩餘數量；庫存不足時回傳
    /// `InsufficientStock`，已寫入的扣減由呼叫端丟棄 unit of work 回滾。
    /// `quantity_needed <= 0` 時不做任何事。
    pub fn consume<U: UnitOfWork>(
        uow: &mut U,
        config: &CostingConfig,
        now: DateTime<Utc>,
        tenant_id: &str,
        warehouse_id: &str,
        material_id: &str,
        quantity_needed: Decimal,
    ) -> hpp_core::Result<Vec<UsageResult>> {
        if quantity_needed <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        let batches = Self::load_ordered(uow, tenant_id, warehouse_id, material_id)?;

        let mut usages = Vec::new();
        let mut remaining = quantity_needed;

        for batch in batches.iter().filter(|b| b.is_available()) {
            if remaining <= Decimal::ZERO {
                break;
            }

            let take = remaining.min(batch.qty_remaining);
            uow.update_material_remaining(batch.id, batch.qty_remaining - take, now)?;

            tracing::debug!(
                "FIFO 扣料: {} 批次 {} 扣減 {} (剩餘 {})",
                material_id,
                batch.batch_code,
                take,
                batch.qty_remaining - take
            );

            usages.push(UsageResult {
                batch_id: batch.id,
                batch_code: batch.batch_code.clone(),
                material_id: material_id.to_string(),
                qty_used: take,
                cost_at_usage: batch.cost_per_unit,
            });
            remaining -= take;
        }

        if remaining > Decimal::ZERO && !config.within_tolerance(remaining) {
            tracing::warn!(
                material_id,
                warehouse_id,
                required = %quantity_needed,
                missing = %remaining,
                "庫存不足，中止扣料"
            );
            return Err(HppError::InsufficientStock {
                material_id: material_id.to_string(),
                warehouse_id: warehouse_id.to_string(),
                required: quantity_needed,
                available: quantity_needed - remaining,
                missing: remaining,
            });
        }

        Ok(usages)
    }

    /// 可用庫存（所有剩餘批次加總）
    pub fn available<U: UnitOfWork>(
        uow: &mut U,
        tenant_id: &str,
        warehouse_id: &str,
        material_id: &str,
    ) -> hpp_core::Result<Decimal> {
        let batches = uow.lock_material_batches(tenant_id, warehouse_id, material_id)?;
        Self::total_remaining(&batches)
    }

    pub(crate) fn total_remaining(batches: &[MaterialStockBatch]) -> hpp_core::Result<Decimal> {
        batches.iter().try_fold(Decimal::ZERO, |acc, b| {
            acc.checked_add(b.qty_remaining)
                .ok_or_else(|| HppError::Calculation("可用庫存加總溢位".to_string()))
        })
    }

    /// 在記憶體中的批次副本上模擬 FIFO 分配（不寫回儲存）
    ///
    /// 回傳分配結果與未滿足的數量。
    pub fn simulate(
        batches: &mut [MaterialStockBatch],
        quantity_needed: Decimal,
    ) -> (Vec<UsageResult>, Decimal) {
        let mut usages = Vec::new();
        let mut remaining = quantity_needed;

        for batch in batches.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            if !batch.is_available() {
                continue;
            }

            let take = remaining.min(batch.qty_remaining);
            batch.qty_remaining -= take;
            usages.push(UsageResult {
                batch_id: batch.id,
                batch_code: batch.batch_code.clone(),
                material_id: batch.material_id.clone(),
                qty_used: take,
                cost_at_usage: batch.cost_per_unit,
            });
            remaining -= take;
        }

        (usages, remaining.max(Decimal::ZERO))
    }

    /// 讀取並依入庫時間穩定排序（同時間保留儲存層給的寫入順序）
    pub(crate) fn load_ordered<U: UnitOfWork>(
        uow: &mut U,
        tenant_id: &str,
        warehouse_id: &str,
        material_id: &str,
    ) -> hpp_core::Result<Vec<MaterialStockBatch>> {
        let mut batches = uow.lock_material_batches(tenant_id, warehouse_id, material_id)?;
        batches.sort_by_key(|b| b.received_at);
        Ok(batches)
    }
}
