//! 成品入庫

use chrono::{DateTime, Utc};
use hpp_core::{AggregateInventory, HppError, ProductStockBatch, ProductionBatch, UnitOfWork};

/// 成品入庫結果
#[derive(Debug, Clone, PartialEq)]
pub struct PostingResult {
    /// 新建立的成品批次
    pub stock_batch: ProductStockBatch,

    /// 更新後的彙總庫存
    pub inventory: AggregateInventory,
}

/// 成品入庫器
pub struct FinishedGoodsPoster;

impl FinishedGoodsPoster {
    /// 建立成品批次並累加彙總庫存（不存在則新建）
    pub fn post<U: UnitOfWork>(
        uow: &mut U,
        production: &ProductionBatch,
        warehouse_id: &str,
        shelf_id: &str,
        now: DateTime<Utc>,
    ) -> hpp_core::Result<PostingResult> {
        let stock_batch =
            ProductStockBatch::from_production(production, warehouse_id.to_string(), now);
        uow.insert_product_stock_batch(&stock_batch)?;

        let inventory = match uow.lock_aggregate_inventory(
            &production.tenant_id,
            &production.product_id,
            warehouse_id,
            shelf_id,
        )? {
            Some(mut existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(production.produced_qty)
                    .ok_or_else(|| HppError::Calculation("彙總庫存數量溢位".to_string()))?;
                existing.updated_at = now;
                uow.update_aggregate_quantity(existing.id, existing.quantity, now)?;
                existing
            }
            None => {
                let created = AggregateInventory::new(
                    production.tenant_id.clone(),
                    production.product_id.clone(),
                    warehouse_id.to_string(),
                    shelf_id.to_string(),
                    production.produced_qty,
                    now,
                );
                uow.insert_aggregate_inventory(&created)?;
                created
            }
        };

        tracing::debug!(
            "成品入庫: {} 批次 {} 數量 {} → {}/{} 現有 {}",
            production.product_id,
            stock_batch.batch_code,
            stock_batch.qty_total,
            warehouse_id,
            shelf_id,
            inventory.quantity
        );

        Ok(PostingResult {
            stock_batch,
            inventory,
        })
    }
}
