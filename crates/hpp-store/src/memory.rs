//! 記憶體交易儲存
//!
//! 整個儲存由一把互斥鎖保護，unit of work 在存活期間持有鎖，
//! 因此同時只有一個 unit of work 能讀寫（等同所有資料列都被鎖定）。
//! 每次異動都記錄 undo 項目；未提交就被丟棄時反向重放回滾。

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use hpp_core::{
    AggregateInventory, Composition, HppError, MaterialStockBatch, ProductStockBatch,
    ProductionBatch, ProductionMaterialUsage, Result, Store, UnitOfWork,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::dirty_tracking::{DirtyTracker, RecordKind};

#[derive(Debug, Default)]
struct StoreState {
    material_batches: Vec<MaterialStockBatch>,
    compositions: Vec<Composition>,
    production_batches: Vec<ProductionBatch>,
    usages: Vec<ProductionMaterialUsage>,
    product_batches: Vec<ProductStockBatch>,
    inventories: Vec<AggregateInventory>,
}

/// 回滾項目（新增一律 push 到尾端，回滾時 pop）
#[derive(Debug)]
enum Undo {
    MaterialInserted,
    MaterialRemaining {
        index: usize,
        qty_remaining: Decimal,
        updated_at: DateTime<Utc>,
    },
    CompositionInserted,
    ProductionInserted,
    ProductionReplaced {
        index: usize,
        previous: Box<ProductionBatch>,
    },
    UsageInserted,
    ProductBatchInserted,
    InventoryInserted,
    InventoryQuantity {
        index: usize,
        quantity: Decimal,
        updated_at: DateTime<Utc>,
    },
}

impl StoreState {
    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::MaterialInserted => {
                self.material_batches.pop();
            }
            Undo::MaterialRemaining {
                index,
                qty_remaining,
                updated_at,
            } => {
                if let Some(batch) = self.material_batches.get_mut(index) {
                    batch.qty_remaining = qty_remaining;
                    batch.updated_at = updated_at;
                }
            }
            Undo::CompositionInserted => {
                self.compositions.pop();
            }
            Undo::ProductionInserted => {
                self.production_batches.pop();
            }
            Undo::ProductionReplaced { index, previous } => {
                if let Some(batch) = self.production_batches.get_mut(index) {
                    *batch = *previous;
                }
            }
            Undo::UsageInserted => {
                self.usages.pop();
            }
            Undo::ProductBatchInserted => {
                self.product_batches.pop();
            }
            Undo::InventoryInserted => {
                self.inventories.pop();
            }
            Undo::InventoryQuantity {
                index,
                quantity,
                updated_at,
            } => {
                if let Some(inventory) = self.inventories.get_mut(index) {
                    inventory.quantity = quantity;
                    inventory.updated_at = updated_at;
                }
            }
        }
    }
}

/// 記憶體交易儲存
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// 創建空的儲存
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有物料批次（依寫入順序）
    ///
    /// 以下檢視方法會取得儲存鎖，不可在同一執行緒持有 unit of work 時呼叫。
    pub fn material_batches(&self) -> Vec<MaterialStockBatch> {
        self.snapshot(|s| s.material_batches.clone())
    }

    /// 所有生產批次
    pub fn production_batches(&self) -> Vec<ProductionBatch> {
        self.snapshot(|s| s.production_batches.clone())
    }

    /// 所有耗用記錄
    pub fn material_usages(&self) -> Vec<ProductionMaterialUsage> {
        self.snapshot(|s| s.usages.clone())
    }

    /// 所有成品批次
    pub fn product_stock_batches(&self) -> Vec<ProductStockBatch> {
        self.snapshot(|s| s.product_batches.clone())
    }

    /// 所有彙總庫存
    pub fn aggregate_inventories(&self) -> Vec<AggregateInventory> {
        self.snapshot(|s| s.inventories.clone())
    }

    fn snapshot<T>(&self, read: impl FnOnce(&StoreState) -> T) -> T {
        // 未提交的異動已在 unit of work 釋放鎖前回滾，中毒的鎖內資料仍一致
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        read(&state)
    }
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryUnitOfWork<'a>;

    fn begin(&self) -> Result<MemoryUnitOfWork<'_>> {
        let state = self.state.lock().unwrap_or_else(|poisoned| {
            // 持鎖的 unit of work 在 panic 時已於 Drop 回滾
            tracing::warn!("儲存鎖曾因 panic 中毒，繼續使用已回滾的狀態");
            poisoned.into_inner()
        });
        Ok(MemoryUnitOfWork {
            state,
            undo: Vec::new(),
            tracker: DirtyTracker::new(),
            committed: false,
        })
    }
}

/// 記憶體 unit of work
pub struct MemoryUnitOfWork<'a> {
    state: MutexGuard<'a, StoreState>,
    undo: Vec<Undo>,
    tracker: DirtyTracker,
    committed: bool,
}

impl MemoryUnitOfWork<'_> {
    /// 本 unit of work 寫過的資料列
    pub fn dirty_records(&self) -> &DirtyTracker {
        &self.tracker
    }

    fn record(&mut self, undo: Undo, kind: RecordKind, id: Uuid) {
        self.undo.push(undo);
        self.tracker.mark_dirty(kind, id);
    }

    fn rollback(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        tracing::warn!(
            "交易未提交，回滾 {} 項異動（{} 筆資料列）",
            self.undo.len(),
            self.tracker.len()
        );
        while let Some(undo) = self.undo.pop() {
            self.state.revert(undo);
        }
        self.tracker.clear();
    }
}

impl Drop for MemoryUnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn insert_material_batch(&mut self, batch: &MaterialStockBatch) -> Result<()> {
        let duplicate = self
            .state
            .material_batches
            .iter()
            .any(|b| b.tenant_id == batch.tenant_id && b.batch_code == batch.batch_code);
        if duplicate {
            return Err(HppError::DuplicateBatchCode(batch.batch_code.clone()));
        }

        self.state.material_batches.push(batch.clone());
        self.record(Undo::MaterialInserted, RecordKind::MaterialBatch, batch.id);
        Ok(())
    }

    fn lock_material_batches(
        &mut self,
        tenant_id: &str,
        warehouse_id: &str,
        material_id: &str,
    ) -> Result<Vec<MaterialStockBatch>> {
        let mut batches: Vec<MaterialStockBatch> = self
            .state
            .material_batches
            .iter()
            .filter(|b| {
                b.tenant_id == tenant_id
                    && b.warehouse_id == warehouse_id
                    && b.material_id == material_id
                    && b.is_available()
            })
            .cloned()
            .collect();
        // 穩定排序：同一入庫時間保留寫入順序
        batches.sort_by_key(|b| b.received_at);
        Ok(batches)
    }

    fn update_material_remaining(
        &mut self,
        batch_id: Uuid,
        qty_remaining: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let index = self
            .state
            .material_batches
            .iter()
            .position(|b| b.id == batch_id)
            .ok_or_else(|| HppError::not_found("material batch", batch_id))?;

        let batch = &mut self.state.material_batches[index];
        if qty_remaining < Decimal::ZERO || qty_remaining > batch.qty_remaining {
            return Err(HppError::Store(format!(
                "批次 {} 剩餘量只能遞減: {} → {}",
                batch.batch_code, batch.qty_remaining, qty_remaining
            )));
        }

        let undo = Undo::MaterialRemaining {
            index,
            qty_remaining: batch.qty_remaining,
            updated_at: batch.updated_at,
        };
        batch.qty_remaining = qty_remaining;
        batch.updated_at = updated_at;
        self.record(undo, RecordKind::MaterialBatch, batch_id);
        Ok(())
    }

    fn insert_composition(&mut self, composition: &Composition) -> Result<()> {
        self.state.compositions.push(composition.clone());
        self.record(Undo::CompositionInserted, RecordKind::Composition, composition.id);
        Ok(())
    }

    fn compositions_for_product(
        &mut self,
        tenant_id: &str,
        product_id: &str,
    ) -> Result<Vec<Composition>> {
        Ok(self
            .state
            .compositions
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.product_id == product_id)
            .cloned()
            .collect())
    }

    fn insert_production_batch(&mut self, batch: &ProductionBatch) -> Result<()> {
        let duplicate = self
            .state
            .production_batches
            .iter()
            .any(|b| b.tenant_id == batch.tenant_id && b.batch_code == batch.batch_code);
        if duplicate {
            return Err(HppError::DuplicateBatchCode(batch.batch_code.clone()));
        }

        self.state.production_batches.push(batch.clone());
        self.record(Undo::ProductionInserted, RecordKind::ProductionBatch, batch.id);
        Ok(())
    }

    fn lock_production_batch(
        &mut self,
        tenant_id: &str,
        batch_id: Uuid,
    ) -> Result<Option<ProductionBatch>> {
        Ok(self
            .state
            .production_batches
            .iter()
            .find(|b| b.id == batch_id && b.tenant_id == tenant_id)
            .cloned())
    }

    fn update_production_batch(&mut self, batch: &ProductionBatch) -> Result<()> {
        let index = self
            .state
            .production_batches
            .iter()
            .position(|b| b.id == batch.id)
            .ok_or_else(|| HppError::not_found("production batch", batch.id))?;

        let previous = std::mem::replace(&mut self.state.production_batches[index], batch.clone());
        self.record(
            Undo::ProductionReplaced {
                index,
                previous: Box::new(previous),
            },
            RecordKind::ProductionBatch,
            batch.id,
        );
        Ok(())
    }

    fn insert_material_usage(&mut self, usage: &ProductionMaterialUsage) -> Result<()> {
        let parent_exists = self
            .state
            .production_batches
            .iter()
            .any(|b| b.id == usage.production_batch_id);
        if !parent_exists {
            return Err(HppError::not_found("production batch", usage.production_batch_id));
        }

        self.state.usages.push(usage.clone());
        self.record(Undo::UsageInserted, RecordKind::MaterialUsage, usage.id);
        Ok(())
    }

    fn material_usages(&mut self, production_batch_id: Uuid) -> Result<Vec<ProductionMaterialUsage>> {
        Ok(self
            .state
            .usages
            .iter()
            .filter(|u| u.production_batch_id == production_batch_id)
            .cloned()
            .collect())
    }

    fn insert_product_stock_batch(&mut self, batch: &ProductStockBatch) -> Result<()> {
        self.state.product_batches.push(batch.clone());
        self.record(Undo::ProductBatchInserted, RecordKind::ProductStockBatch, batch.id);
        Ok(())
    }

    fn product_stock_batches(&mut self, reference_id: Uuid) -> Result<Vec<ProductStockBatch>> {
        Ok(self
            .state
            .product_batches
            .iter()
            .filter(|b| b.reference_id == reference_id)
            .cloned()
            .collect())
    }

    fn lock_aggregate_inventory(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        warehouse_id: &str,
        shelf_id: &str,
    ) -> Result<Option<AggregateInventory>> {
        Ok(self
            .state
            .inventories
            .iter()
            .find(|i| {
                i.tenant_id == tenant_id
                    && i.product_id == product_id
                    && i.warehouse_id == warehouse_id
                    && i.shelf_id == shelf_id
            })
            .cloned())
    }

    fn insert_aggregate_inventory(&mut self, inventory: &AggregateInventory) -> Result<()> {
        self.state.inventories.push(inventory.clone());
        self.record(
            Undo::InventoryInserted,
            RecordKind::AggregateInventory,
            inventory.id,
        );
        Ok(())
    }

    fn update_aggregate_quantity(
        &mut self,
        inventory_id: Uuid,
        quantity: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let index = self
            .state
            .inventories
            .iter()
            .position(|i| i.id == inventory_id)
            .ok_or_else(|| HppError::not_found("aggregate inventory", inventory_id))?;

        let inventory = &mut self.state.inventories[index];
        let undo = Undo::InventoryQuantity {
            index,
            quantity: inventory.quantity,
            updated_at: inventory.updated_at,
        };
        inventory.quantity = quantity;
        inventory.updated_at = updated_at;
        self.record(undo, RecordKind::AggregateInventory, inventory_id);
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        tracing::debug!(
            "交易提交：{} 項異動，{} 筆資料列",
            self.undo.len(),
            self.tracker.len()
        );
        self.undo.clear();
        self.committed = true;
        Ok(())
    }
}
