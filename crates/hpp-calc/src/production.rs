//! 生產批次狀態機
//!
//! `IN_PROGRESS` →（完工）→ `COMPLETED`。開工扣料、完工計算 HPP 並入庫成品；
//! 兩者都只在呼叫端提供的 unit of work 中操作，是否提交由呼叫端決定。

use chrono::{DateTime, Utc};
use hpp_core::{
    Clock, CostingConfig, HppError, MaterialStockBatch, ProductionBatch, ProductionMaterialUsage,
    UnitOfWork,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch_code::BatchCodeGenerator;
use crate::composition::CompositionResolver;
use crate::costing::CostCalculator;
use crate::fifo::FifoConsumer;
use crate::posting::FinishedGoodsPoster;

/// 開工請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartProduction {
    pub tenant_id: String,
    /// 扣料倉庫
    pub warehouse_id: String,
    pub product_id: String,
    pub planned_qty: Decimal,
}

impl StartProduction {
    pub fn new(
        tenant_id: impl Into<String>,
        warehouse_id: impl Into<String>,
        product_id: impl Into<String>,
        planned_qty: Decimal,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            warehouse_id: warehouse_id.into(),
            product_id: product_id.into(),
            planned_qty,
        }
    }
}

/// 完工請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteProduction {
    pub tenant_id: String,
    pub production_batch_id: Uuid,
    pub actual_produced_qty: Decimal,
    /// 成品入庫倉庫
    pub target_warehouse_id: String,
    /// 成品入庫儲位
    pub target_shelf_id: String,
    /// 製造費用（預設 0）
    pub overhead_cost: Decimal,
}

impl CompleteProduction {
    pub fn new(
        tenant_id: impl Into<String>,
        production_batch_id: Uuid,
        actual_produced_qty: Decimal,
        target_warehouse_id: impl Into<String>,
        target_shelf_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            production_batch_id,
            actual_produced_qty,
            target_warehouse_id: target_warehouse_id.into(),
            target_shelf_id: target_shelf_id.into(),
            overhead_cost: Decimal::ZERO,
        }
    }

    /// 建構器模式：設置製造費用
    pub fn with_overhead_cost(mut self, overhead_cost: Decimal) -> Self {
        self.overhead_cost = overhead_cost;
        self
    }
}

/// 物料入庫請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveMaterial {
    pub tenant_id: String,
    pub warehouse_id: String,
    pub material_id: String,
    pub quantity: Decimal,
    pub cost_per_unit: Decimal,
    /// 入庫時間（未指定時取目前時間）
    pub received_at: Option<DateTime<Utc>>,
}

impl ReceiveMaterial {
    pub fn new(
        tenant_id: impl Into<String>,
        warehouse_id: impl Into<String>,
        material_id: impl Into<String>,
        quantity: Decimal,
        cost_per_unit: Decimal,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            warehouse_id: warehouse_id.into(),
            material_id: material_id.into(),
            quantity,
            cost_per_unit,
            received_at: None,
        }
    }

    /// 建構器模式：設置入庫時間
    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }
}

/// 生產引擎
pub struct ProductionEngine<C, G> {
    clock: C,
    codes: G,
    config: CostingConfig,
}

impl<C: Clock, G: BatchCodeGenerator> ProductionEngine<C, G> {
    /// 創建新的生產引擎
    pub fn new(clock: C, codes: G, config: CostingConfig) -> hpp_core::Result<Self> {
        config.validate()?;
        Ok(Self {
            clock,
            codes,
            config,
        })
    }

    /// 開工
    ///
    /// 解析配方、依計劃產量對每一項物料做 FIFO 扣料，寫入生產批次與耗用記錄。
    /// 任一物料不足即回傳錯誤；呼叫端丟棄 unit of work 即可回滾所有扣減。
    pub fn start<U: UnitOfWork>(
        &self,
        uow: &mut U,
        request: &StartProduction,
    ) -> hpp_core::Result<ProductionBatch> {
        if request.planned_qty <= Decimal::ZERO {
            return Err(HppError::InvalidQuantity {
                field: "planned_qty",
                value: request.planned_qty,
            });
        }

        let composition =
            CompositionResolver::resolve_active(uow, &request.tenant_id, &request.product_id)?;
        let now = self.clock.now();

        tracing::info!(
            "開始生產：產品 {} 計劃 {}，配方物料 {} 項",
            request.product_id,
            request.planned_qty,
            composition.materials.len()
        );

        let mut consumed = Vec::new();
        for line in &composition.materials {
            let needed = line.required_for(request.planned_qty)?;
            let usages = FifoConsumer::consume(
                uow,
                &self.config,
                now,
                &request.tenant_id,
                &request.warehouse_id,
                &line.material_id,
                needed,
            )?;
            consumed.extend(usages);
        }

        let total_material_cost = CostCalculator::total_material_cost(&consumed)?;

        let batch = self.insert_with_unique_code(
            uow,
            &self.config.production_code_prefix,
            now,
            |code| {
                ProductionBatch::start(
                    request.tenant_id.clone(),
                    code,
                    request.product_id.clone(),
                    request.planned_qty,
                    total_material_cost,
                    now,
                )
            },
            |uow, batch| uow.insert_production_batch(batch),
        )?;

        for usage in &consumed {
            let row = ProductionMaterialUsage::new(
                batch.id,
                usage.batch_id,
                usage.material_id.clone(),
                usage.qty_used,
                usage.cost_at_usage,
            );
            uow.insert_material_usage(&row)?;
        }

        tracing::info!(
            "生產批次 {} 已開工：耗用記錄 {} 筆，物料成本 {}",
            batch.batch_code,
            consumed.len(),
            batch.total_material_cost
        );

        Ok(batch)
    }

    /// 完工
    ///
    /// 固定實際產量、計算總成本與 HPP，寫入成品批次並累加彙總庫存。
    pub fn complete<U: UnitOfWork>(
        &self,
        uow: &mut U,
        request: &CompleteProduction,
    ) -> hpp_core::Result<ProductionBatch> {
        if request.actual_produced_qty < Decimal::ZERO {
            return Err(HppError::InvalidQuantity {
                field: "actual_produced_qty",
                value: request.actual_produced_qty,
            });
        }
        if request.overhead_cost < Decimal::ZERO {
            return Err(HppError::InvalidQuantity {
                field: "overhead_cost",
                value: request.overhead_cost,
            });
        }

        let mut batch = uow
            .lock_production_batch(&request.tenant_id, request.production_batch_id)?
            .ok_or_else(|| HppError::not_found("production batch", request.production_batch_id))?;

        if let Err(err) = batch.ensure_in_progress() {
            tracing::warn!("生產批次 {} 重複完工，拒絕", batch.batch_code);
            return Err(err);
        }

        let cost = CostCalculator::finalize(
            batch.total_material_cost,
            request.overhead_cost,
            request.actual_produced_qty,
        )?;
        let now = self.clock.now();

        batch.complete(
            request.actual_produced_qty,
            request.overhead_cost,
            cost.total_cost,
            cost.hpp_per_unit,
            now,
        )?;
        uow.update_production_batch(&batch)?;

        FinishedGoodsPoster::post(
            uow,
            &batch,
            &request.target_warehouse_id,
            &request.target_shelf_id,
            now,
        )?;

        tracing::info!(
            "生產批次 {} 完工：產量 {}，總成本 {}，HPP {}",
            batch.batch_code,
            batch.produced_qty,
            batch.total_cost,
            batch.hpp_per_unit
        );

        Ok(batch)
    }

    /// 物料入庫（建立新批次，不修改既有批次）
    pub fn receive_material<U: UnitOfWork>(
        &self,
        uow: &mut U,
        request: &ReceiveMaterial,
    ) -> hpp_core::Result<MaterialStockBatch> {
        if request.quantity <= Decimal::ZERO {
            return Err(HppError::InvalidQuantity {
                field: "quantity",
                value: request.quantity,
            });
        }
        if request.cost_per_unit < Decimal::ZERO {
            return Err(HppError::InvalidQuantity {
                field: "cost_per_unit",
                value: request.cost_per_unit,
            });
        }

        let now = self.clock.now();
        let received_at = request.received_at.unwrap_or(now);

        let batch = self.insert_with_unique_code(
            uow,
            &self.config.material_code_prefix,
            now,
            |code| {
                MaterialStockBatch::new(
                    request.tenant_id.clone(),
                    request.warehouse_id.clone(),
                    request.material_id.clone(),
                    code,
                    request.quantity,
                    request.cost_per_unit,
                    received_at,
                )
            },
            |uow, batch| uow.insert_material_batch(batch),
        )?;

        tracing::info!(
            "物料入庫：{} 於 {} 數量 {} 單位成本 {}（批號 {}）",
            batch.material_id,
            batch.warehouse_id,
            batch.qty_total,
            batch.cost_per_unit,
            batch.batch_code
        );

        Ok(batch)
    }

    /// 成本核算配置
    pub fn config(&self) -> &CostingConfig {
        &self.config
    }

    /// 以新批號寫入；批號重複時重試，超過上限回傳 `BatchCodeExhausted`
    fn insert_with_unique_code<U, T>(
        &self,
        uow: &mut U,
        prefix: &str,
        now: DateTime<Utc>,
        mut build: impl FnMut(String) -> T,
        mut insert: impl FnMut(&mut U, &T) -> hpp_core::Result<()>,
    ) -> hpp_core::Result<T>
    where
        U: UnitOfWork,
    {
        let attempts = self.config.max_code_attempts;
        for attempt in 1..=attempts {
            let record = build(self.codes.next_code(prefix, now));
            match insert(uow, &record) {
                Ok(()) => return Ok(record),
                Err(HppError::DuplicateBatchCode(code)) => {
                    tracing::warn!("批號 {} 重複，重新產生（第 {} 次）", code, attempt);
                }
                Err(err) => return Err(err),
            }
        }
        Err(HppError::BatchCodeExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequentialBatchCodeGenerator;
    use chrono::{Duration, TimeZone};
    use hpp_core::{Composition, FixedClock, ProductionStatus, Store};
    use hpp_store::MemoryStore;

    struct ConstantCode;

    impl BatchCodeGenerator for ConstantCode {
        fn next_code(&self, prefix: &str, _now: DateTime<Utc>) -> String {
            format!("{}-SAME", prefix)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap()
    }

    fn engine() -> ProductionEngine<FixedClock, SequentialBatchCodeGenerator> {
        ProductionEngine::new(
            FixedClock::new(t0() + Duration::days(5)),
            SequentialBatchCodeGenerator::new(),
            CostingConfig::default(),
        )
        .unwrap()
    }

    fn seeded_store<C: Clock, G: BatchCodeGenerator>(engine: &ProductionEngine<C, G>) -> MemoryStore {
        let store = MemoryStore::new();
        let mut uow = store.begin().unwrap();
        uow.insert_composition(
            &Composition::new("T1".to_string(), "P".to_string())
                .with_material("M".to_string(), Decimal::from(2)),
        )
        .unwrap();
        engine
            .receive_material(
                &mut uow,
                &ReceiveMaterial::new("T1", "W", "M", Decimal::from(5), Decimal::from(10))
                    .with_received_at(t0()),
            )
            .unwrap();
        engine
            .receive_material(
                &mut uow,
                &ReceiveMaterial::new("T1", "W", "M", Decimal::from(10), Decimal::from(12))
                    .with_received_at(t0() + Duration::days(1)),
            )
            .unwrap();
        uow.commit().unwrap();
        store
    }

    #[test]
    fn test_start_records_usage_trail() {
        let engine = engine();
        let store = seeded_store(&engine);

        let mut uow = store.begin().unwrap();
        let batch = engine
            .start(&mut uow, &StartProduction::new("T1", "W", "P", Decimal::from(3)))
            .unwrap();
        let usages = uow.material_usages(batch.id).unwrap();
        uow.commit().unwrap();

        assert_eq!(batch.status, ProductionStatus::InProgress);
        assert_eq!(batch.total_material_cost, Decimal::from(62));
        assert_eq!(batch.total_cost, Decimal::from(62));
        assert_eq!(batch.hpp_per_unit, Decimal::ZERO);
        assert!(batch.batch_code.starts_with("PRD-"));
        assert_eq!(usages.len(), 2);
        assert_eq!(
            CostCalculator::usage_material_cost(&usages).unwrap(),
            batch.total_material_cost
        );
    }

    #[test]
    fn test_start_rejects_non_positive_plan() {
        let engine = engine();
        let store = seeded_store(&engine);

        let mut uow = store.begin().unwrap();
        let err = engine
            .start(&mut uow, &StartProduction::new("T1", "W", "P", Decimal::ZERO))
            .unwrap_err();
        assert!(matches!(err, HppError::InvalidQuantity { field: "planned_qty", .. }));
    }

    #[test]
    fn test_complete_posts_finished_goods() {
        let engine = engine();
        let store = seeded_store(&engine);

        let mut uow = store.begin().unwrap();
        let started = engine
            .start(&mut uow, &StartProduction::new("T1", "W", "P", Decimal::from(3)))
            .unwrap();
        let completed = engine
            .complete(
                &mut uow,
                &CompleteProduction::new("T1", started.id, Decimal::from(3), "WH-FG", "S1")
                    .with_overhead_cost(Decimal::from(10)),
            )
            .unwrap();
        let stock = uow.product_stock_batches(started.id).unwrap();
        uow.commit().unwrap();

        assert_eq!(completed.status, ProductionStatus::Completed);
        assert_eq!(completed.total_cost, Decimal::from(72));
        assert_eq!(completed.hpp_per_unit, Decimal::from(24));
        assert_eq!(completed.completed_at, Some(t0() + Duration::days(5)));
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].cost_per_unit, completed.hpp_per_unit);
    }

    #[test]
    fn test_complete_validates_input() {
        let engine = engine();
        let store = seeded_store(&engine);
        let mut uow = store.begin().unwrap();

        let missing = engine
            .complete(
                &mut uow,
                &CompleteProduction::new("T1", Uuid::new_v4(), Decimal::ONE, "WH-FG", "S1"),
            )
            .unwrap_err();
        assert!(matches!(missing, HppError::NotFound { .. }));

        let negative = engine
            .complete(
                &mut uow,
                &CompleteProduction::new("T1", Uuid::new_v4(), Decimal::ONE, "WH-FG", "S1")
                    .with_overhead_cost(Decimal::NEGATIVE_ONE),
            )
            .unwrap_err();
        assert!(matches!(negative, HppError::InvalidQuantity { field: "overhead_cost", .. }));
    }

    #[test]
    fn test_oversized_plan_is_a_calculation_error() {
        let engine = engine();
        let store = seeded_store(&engine);

        {
            let mut uow = store.begin().unwrap();
            let err = engine
                .start(&mut uow, &StartProduction::new("T1", "W", "P", Decimal::MAX))
                .unwrap_err();
            assert!(matches!(err, HppError::Calculation(_)));
        }

        let remaining: Vec<Decimal> = store
            .material_batches()
            .iter()
            .map(|b| b.qty_remaining)
            .collect();
        assert_eq!(remaining, vec![Decimal::from(5), Decimal::from(10)]);
        assert!(store.production_batches().is_empty());
    }

    #[test]
    fn test_complete_from_other_tenant_is_not_found() {
        let engine = engine();
        let store = seeded_store(&engine);

        let mut uow = store.begin().unwrap();
        let started = engine
            .start(&mut uow, &StartProduction::new("T1", "W", "P", Decimal::ONE))
            .unwrap();
        let err = engine
            .complete(
                &mut uow,
                &CompleteProduction::new("T2", started.id, Decimal::ONE, "WH-FG", "S1"),
            )
            .unwrap_err();
        assert!(matches!(err, HppError::NotFound { .. }));
    }

    #[test]
    fn test_duplicate_codes_exhaust_after_bounded_attempts() {
        let engine = ProductionEngine::new(
            FixedClock::new(t0()),
            ConstantCode,
            CostingConfig::default().with_max_code_attempts(3),
        )
        .unwrap();
        let store = MemoryStore::new();

        let mut uow = store.begin().unwrap();
        engine
            .receive_material(&mut uow, &ReceiveMaterial::new("T1", "W", "M", Decimal::ONE, Decimal::ONE))
            .unwrap();
        let err = engine
            .receive_material(&mut uow, &ReceiveMaterial::new("T1", "W", "M", Decimal::ONE, Decimal::ONE))
            .unwrap_err();

        assert_eq!(err, HppError::BatchCodeExhausted { attempts: 3 });
    }

    #[test]
    fn test_receive_rejects_bad_quantities() {
        let engine = engine();
        let store = MemoryStore::new();
        let mut uow = store.begin().unwrap();

        assert!(engine
            .receive_material(&mut uow, &ReceiveMaterial::new("T1", "W", "M", Decimal::ZERO, Decimal::ONE))
            .is_err());
        assert!(engine
            .receive_material(
                &mut uow,
                &ReceiveMaterial::new("T1", "W", "M", Decimal::ONE, Decimal::NEGATIVE_ONE)
            )
            .is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ProductionEngine::new(
            FixedClock::new(t0()),
            SequentialBatchCodeGenerator::new(),
            CostingConfig::default().with_max_code_attempts(0),
        );
        assert!(matches!(result, Err(HppError::InvalidConfig(_))));
    }
}
