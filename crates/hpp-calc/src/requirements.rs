//! 開工前物料需求試算（不扣料）

use std::collections::HashMap;

use hpp_core::{HppError, MaterialStockBatch, UnitOfWork};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::composition::CompositionResolver;
use crate::costing::CostCalculator;
use crate::fifo::FifoConsumer;

/// 單項物料需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: String,
    pub quantity_per_unit: Decimal,

    /// 需求量 = 用量 × 計劃產量
    pub required: Decimal,

    /// 本行開始前可用的庫存（同一物料多行時已扣除前面的行）
    pub available: Decimal,

    /// 短缺量
    pub shortage: Decimal,

    /// 以 FIFO 試算的物料成本（只計算可滿足的部分）
    pub estimated_cost: Decimal,
}

impl MaterialRequirement {
    pub fn is_short(&self) -> bool {
        self.shortage > Decimal::ZERO
    }
}

/// 試算結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementPreview {
    pub product_id: String,
    pub warehouse_id: String,
    pub planned_qty: Decimal,
    pub lines: Vec<MaterialRequirement>,
}

impl RequirementPreview {
    /// 是否所有物料都足夠
    pub fn is_feasible(&self) -> bool {
        self.lines.iter().all(|l| !l.is_short())
    }

    /// 短缺的物料
    pub fn shortages(&self) -> Vec<&MaterialRequirement> {
        self.lines.iter().filter(|l| l.is_short()).collect()
    }

    /// 試算物料總成本
    pub fn estimated_material_cost(&self) -> hpp_core::Result<Decimal> {
        self.lines.iter().try_fold(Decimal::ZERO, |acc, l| {
            acc.checked_add(l.estimated_cost)
                .ok_or_else(|| HppError::Calculation("試算成本溢位".to_string()))
        })
    }
}

/// 物料需求試算器
pub struct RequirementCalculator;

impl RequirementCalculator {
    /// 試算開工所需物料
    ///
    /// 與開工使用相同的配方解析與 FIFO 順序，但只在記憶體副本上扣減，
    /// 並回報所有短缺的物料而不是第一項。
    pub fn preview<U: UnitOfWork>(
        uow: &mut U,
        tolerance: Decimal,
        tenant_id: &str,
        warehouse_id: &str,
        product_id: &str,
        planned_qty: Decimal,
    ) -> hpp_core::Result<RequirementPreview> {
        if planned_qty <= Decimal::ZERO {
            return Err(HppError::InvalidQuantity {
                field: "planned_qty",
                value: planned_qty,
            });
        }

        let composition = CompositionResolver::resolve_active(uow, tenant_id, product_id)?;
        let mut working: HashMap<String, Vec<MaterialStockBatch>> = HashMap::new();
        let mut lines = Vec::with_capacity(composition.materials.len());

        for line in &composition.materials {
            if !working.contains_key(&line.material_id) {
                let batches =
                    FifoConsumer::load_ordered(uow, tenant_id, warehouse_id, &line.material_id)?;
                working.insert(line.material_id.clone(), batches);
            }
            let batches = working
                .get_mut(&line.material_id)
                .ok_or_else(|| HppError::Calculation("試算批次遺失".to_string()))?;

            let required = line.required_for(planned_qty)?;
            let available = FifoConsumer::total_remaining(batches)?;
            let (usages, mut shortage) = FifoConsumer::simulate(batches, required);
            if shortage <= tolerance {
                shortage = Decimal::ZERO;
            }

            lines.push(MaterialRequirement {
                material_id: line.material_id.clone(),
                quantity_per_unit: line.quantity_per_unit,
                required,
                available,
                shortage,
                estimated_cost: CostCalculator::total_material_cost(&usages)?,
            });
        }

        Ok(RequirementPreview {
            product_id: product_id.to_string(),
            warehouse_id: warehouse_id.to_string(),
            planned_qty,
            lines,
        })
    }
}
