//! 生產成本服務
//!
//! 每個操作開啟一個 unit of work，成功才提交；任何錯誤都讓 unit of work 在
//! 離開作用域時回滾。

use hpp_core::{
    Clock, Composition, CostingConfig, HppError, MaterialStockBatch, ProductStockBatch,
    ProductionBatch, ProductionMaterialUsage, Store, UnitOfWork,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::batch_code::BatchCodeGenerator;
use crate::costing::CostSummary;
use crate::fifo::FifoConsumer;
use crate::production::{CompleteProduction, ProductionEngine, ReceiveMaterial, StartProduction};
use crate::requirements::{RequirementCalculator, RequirementPreview};

/// 生產成本服務
pub struct ProductionService<S, C, G> {
    store: S,
    engine: ProductionEngine<C, G>,
}

impl<S: Store, C: Clock, G: BatchCodeGenerator> ProductionService<S, C, G> {
    /// 創建新的服務
    pub fn new(store: S, clock: C, codes: G, config: CostingConfig) -> hpp_core::Result<Self> {
        Ok(Self {
            store,
            engine: ProductionEngine::new(clock, codes, config)?,
        })
    }

    /// 開工
    pub fn start_production(&self, request: &StartProduction) -> hpp_core::Result<ProductionBatch> {
        self.in_transaction(|engine, uow| engine.start(uow, request))
            .map_err(|err| {
                tracing::warn!("產品 {} 開工失敗，已回滾: {}", request.product_id, err);
                err
            })
    }

    /// 完工
    pub fn complete_production(
        &self,
        request: &CompleteProduction,
    ) -> hpp_core::Result<ProductionBatch> {
        self.in_transaction(|engine, uow| engine.complete(uow, request))
    }

    /// 物料入庫
    pub fn receive_material(&self, request: &ReceiveMaterial) -> hpp_core::Result<MaterialStockBatch> {
        self.in_transaction(|engine, uow| engine.receive_material(uow, request))
    }

    /// 登錄配方
    pub fn register_composition(&self, composition: &Composition) -> hpp_core::Result<()> {
        self.in_transaction(|_, uow| uow.insert_composition(composition))
    }

    /// 可用庫存
    pub fn available_stock(
        &self,
        tenant_id: &str,
        warehouse_id: &str,
        material_id: &str,
    ) -> hpp_core::Result<Decimal> {
        let mut uow = self.store.begin()?;
        FifoConsumer::available(&mut uow, tenant_id, warehouse_id, material_id)
    }

    /// 開工前需求試算
    pub fn preview_requirements(
        &self,
        tenant_id: &str,
        warehouse_id: &str,
        product_id: &str,
        planned_qty: Decimal,
    ) -> hpp_core::Result<RequirementPreview> {
        let mut uow = self.store.begin()?;
        RequirementCalculator::preview(
            &mut uow,
            self.engine.config().stock_tolerance,
            tenant_id,
            warehouse_id,
            product_id,
            planned_qty,
        )
    }

    /// 讀取生產批次
    pub fn production_batch(&self, tenant_id: &str, batch_id: Uuid) -> hpp_core::Result<ProductionBatch> {
        let mut uow = self.store.begin()?;
        Self::load_batch(&mut uow, tenant_id, batch_id)
    }

    /// 讀取生產批次的耗用記錄
    pub fn material_usages(
        &self,
        tenant_id: &str,
        batch_id: Uuid,
    ) -> hpp_core::Result<Vec<ProductionMaterialUsage>> {
        let mut uow = self.store.begin()?;
        Self::load_batch(&mut uow, tenant_id, batch_id)?;
        uow.material_usages(batch_id)
    }

    /// 讀取生產批次產出的成品批次
    pub fn finished_goods(
        &self,
        tenant_id: &str,
        batch_id: Uuid,
    ) -> hpp_core::Result<Vec<ProductStockBatch>> {
        let mut uow = self.store.begin()?;
        Self::load_batch(&mut uow, tenant_id, batch_id)?;
        uow.product_stock_batches(batch_id)
    }

    /// 成本追溯摘要
    pub fn cost_summary(&self, tenant_id: &str, batch_id: Uuid) -> hpp_core::Result<CostSummary> {
        let mut uow = self.store.begin()?;
        let batch = Self::load_batch(&mut uow, tenant_id, batch_id)?;
        let usages = uow.material_usages(batch_id)?;
        CostSummary::build(&batch, &usages)
    }

    /// 成本核算配置
    pub fn config(&self) -> &CostingConfig {
        self.engine.config()
    }

    /// 底層儲存
    pub fn store(&self) -> &S {
        &self.store
    }

    fn in_transaction<'s, T>(
        &'s self,
        work: impl FnOnce(&ProductionEngine<C, G>, &mut S::Tx<'s>) -> hpp_core::Result<T>,
    ) -> hpp_core::Result<T> {
        let mut uow = self.store.begin()?;
        let value = work(&self.engine, &mut uow)?;
        uow.commit()?;
        Ok(value)
    }

    fn load_batch<U: UnitOfWork>(
        uow: &mut U,
        tenant_id: &str,
        batch_id: Uuid,
    ) -> hpp_core::Result<ProductionBatch> {
        uow.lock_production_batch(tenant_id, batch_id)?
            .ok_or_else(|| HppError::not_found("production batch", batch_id))
    }
}
