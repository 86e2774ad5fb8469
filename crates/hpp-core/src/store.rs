//! 儲存介面
//!
//! 所有讀寫都經由 [`UnitOfWork`] 進行；一個 unit of work 內的異動要嘛一起提交，
//! 要嘛在未呼叫 [`UnitOfWork::commit`] 就被丟棄時全部回滾。
//! 實作必須保證：`lock_*` 讀出的資料列在本 unit of work 結束前不會被其他
//! unit of work 修改（列鎖或整體序列化皆可）。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    AggregateInventory, Composition, MaterialStockBatch, ProductStockBatch, ProductionBatch,
    ProductionMaterialUsage, Result,
};

/// 交易儲存
pub trait Store {
    type Tx<'a>: UnitOfWork
    where
        Self: 'a;

    /// 開始一個 unit of work
    fn begin(&self) -> Result<Self::Tx<'_>>;
}

/// 交易範圍內的資料存取
pub trait UnitOfWork {
    /// 新增物料批次；批號重複回傳 `DuplicateBatchCode`
    fn insert_material_batch(&mut self, batch: &MaterialStockBatch) -> Result<()>;

    /// 鎖定並讀取仍有剩餘的物料批次，依入庫時間（同時間依寫入順序）由舊到新排列
    fn lock_material_batches(
        &mut self,
        tenant_id: &str,
        warehouse_id: &str,
        material_id: &str,
    ) -> Result<Vec<MaterialStockBatch>>;

    /// 更新物料批次剩餘數量
    fn update_material_remaining(
        &mut self,
        batch_id: Uuid,
        qty_remaining: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// 新增配方
    fn insert_composition(&mut self, composition: &Composition) -> Result<()>;

    /// 讀取產品的所有配方（含範本）
    fn compositions_for_product(
        &mut self,
        tenant_id: &str,
        product_id: &str,
    ) -> Result<Vec<Composition>>;

    /// 新增生產批次；批號重複回傳 `DuplicateBatchCode`
    fn insert_production_batch(&mut self, batch: &ProductionBatch) -> Result<()>;

    /// 鎖定並讀取生產批次（租戶不符視為不存在）
    fn lock_production_batch(
        &mut self,
        tenant_id: &str,
        batch_id: Uuid,
    ) -> Result<Option<ProductionBatch>>;

    /// 覆寫生產批次
    fn update_production_batch(&mut self, batch: &ProductionBatch) -> Result<()>;

    /// 新增物料耗用記錄
    fn insert_material_usage(&mut self, usage: &ProductionMaterialUsage) -> Result<()>;

    /// 讀取生產批次的耗用記錄（依寫入順序）
    fn material_usages(&mut self, production_batch_id: Uuid)
        -> Result<Vec<ProductionMaterialUsage>>;

    /// 新增成品批次
    fn insert_product_stock_batch(&mut self, batch: &ProductStockBatch) -> Result<()>;

    /// 讀取某生產批次產出的成品批次
    fn product_stock_batches(&mut self, reference_id: Uuid) -> Result<Vec<ProductStockBatch>>;

    /// 鎖定並讀取彙總庫存
    fn lock_aggregate_inventory(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        warehouse_id: &str,
        shelf_id: &str,
    ) -> Result<Option<AggregateInventory>>;

    /// 新增彙總庫存
    fn insert_aggregate_inventory(&mut self, inventory: &AggregateInventory) -> Result<()>;

    /// 更新彙總庫存數量
    fn update_aggregate_quantity(
        &mut self,
        inventory_id: Uuid,
        quantity: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// 提交
    fn commit(self) -> Result<()>
    where
        Self: Sized;
}
