//! 生產成本計算

use hpp_core::{HppError, ProductionBatch, ProductionMaterialUsage, ProductionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fifo::UsageResult;

/// 完工成本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// 總成本 = 物料成本 + 製造費用
    pub total_cost: Decimal,

    /// 單位生產成本
    pub hpp_per_unit: Decimal,
}

/// 成本計算器
pub struct CostCalculator;

impl CostCalculator {
    /// 物料總成本 = Σ 扣減數量 × 單位成本
    pub fn total_material_cost(usages: &[UsageResult]) -> hpp_core::Result<Decimal> {
        Self::sum_lines(usages.iter().map(|u| (u.qty_used, u.cost_at_usage)))
    }

    /// 由已寫入的耗用記錄重算物料成本
    pub fn usage_material_cost(usages: &[ProductionMaterialUsage]) -> hpp_core::Result<Decimal> {
        usages.iter().try_fold(Decimal::ZERO, |acc, usage| {
            acc.checked_add(usage.line_cost()?)
                .ok_or_else(|| HppError::Calculation("物料成本溢位".to_string()))
        })
    }

    /// 計算完工成本
    ///
    /// 實際產量為 0 時（例如全數報廢）單位成本記為 0。
    pub fn finalize(
        total_material_cost: Decimal,
        overhead_cost: Decimal,
        produced_qty: Decimal,
    ) -> hpp_core::Result<CostBreakdown> {
        let total_cost = total_material_cost
            .checked_add(overhead_cost)
            .ok_or_else(|| HppError::Calculation("總成本溢位".to_string()))?;

        let hpp_per_unit = if produced_qty > Decimal::ZERO {
            total_cost
                .checked_div(produced_qty)
                .ok_or_else(|| HppError::Calculation("單位成本計算溢位".to_string()))?
        } else {
            Decimal::ZERO
        };

        Ok(CostBreakdown {
            total_cost,
            hpp_per_unit,
        })
    }

    fn sum_lines(mut lines: impl Iterator<Item = (Decimal, Decimal)>) -> hpp_core::Result<Decimal> {
        lines.try_fold(Decimal::ZERO, |acc, (qty, cost)| {
            qty.checked_mul(cost)
                .and_then(|line| acc.checked_add(line))
                .ok_or_else(|| HppError::Calculation("物料成本溢位".to_string()))
        })
    }
}

/// 生產批次成本追溯摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub batch_id: Uuid,
    pub batch_code: String,
    pub status: ProductionStatus,
    pub produced_qty: Decimal,

    /// 耗用記錄筆數
    pub usage_count: usize,

    /// 由耗用記錄重算的物料成本
    pub usage_material_cost: Decimal,

    /// 批次上記錄的物料成本
    pub total_material_cost: Decimal,
    pub overhead_cost: Decimal,
    pub total_cost: Decimal,
    pub hpp_per_unit: Decimal,
}

impl CostSummary {
    /// 由批次與其耗用記錄建立摘要
    pub fn build(
        batch: &ProductionBatch,
        usages: &[ProductionMaterialUsage],
    ) -> hpp_core::Result<Self> {
        Ok(Self {
            batch_id: batch.id,
            batch_code: batch.batch_code.clone(),
            status: batch.status,
            produced_qty: batch.produced_qty,
            usage_count: usages.len(),
            usage_material_cost: CostCalculator::usage_material_cost(usages)?,
            total_material_cost: batch.total_material_cost,
            overhead_cost: batch.overhead_cost,
            total_cost: batch.total_cost,
            hpp_per_unit: batch.hpp_per_unit,
        })
    }

    /// 成本是否可追溯一致
    ///
    /// - 耗用記錄重算值等於批次物料成本
    /// - 總成本等於物料成本加製造費用
    /// - 已完工時 `hpp × 產量` 在容差內等於總成本（產量為 0 時 hpp 必為 0）
    pub fn is_consistent(&self, tolerance: Decimal) -> bool {
        if self.usage_material_cost != self.total_material_cost {
            return false;
        }
        if self.total_material_cost.checked_add(self.overhead_cost) != Some(self.total_cost) {
            return false;
        }
        if self.status != ProductionStatus::Completed {
            return true;
        }
        if self.produced_qty > Decimal::ZERO {
            self.hpp_per_unit
                .checked_mul(self.produced_qty)
                .and_then(|value| value.checked_sub(self.total_cost))
                .is_some_and(|diff| diff.abs() <= tolerance)
        } else {
            self.hpp_per_unit == Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn usage(qty: i64, cost: i64) -> UsageResult {
        UsageResult {
            batch_id: Uuid::new_v4(),
            batch_code: "LOT".to_string(),
            material_id: "M".to_string(),
            qty_used: Decimal::from(qty),
            cost_at_usage: Decimal::from(cost),
        }
    }

    #[test]
    fn test_total_material_cost() {
        let usages = vec![usage(5, 10), usage(1, 12)];
        assert_eq!(
            CostCalculator::total_material_cost(&usages).unwrap(),
            Decimal::from(62)
        );
        assert_eq!(
            CostCalculator::total_material_cost(&[]).unwrap(),
            Decimal::ZERO
        );
    }

    #[rstest]
    #[case(62, 10, 3, 72, Decimal::from(24))]
    #[case(62, 5, 0, 67, Decimal::ZERO)]
    #[case(100, 0, 4, 100, Decimal::from(25))]
    fn test_finalize(
        #[case] material: i64,
        #[case] overhead: i64,
        #[case] produced: i64,
        #[case] total: i64,
        #[case] hpp: Decimal,
    ) {
        let breakdown = CostCalculator::finalize(
            Decimal::from(material),
            Decimal::from(overhead),
            Decimal::from(produced),
        )
        .unwrap();

        assert_eq!(breakdown.total_cost, Decimal::from(total));
        assert_eq!(breakdown.hpp_per_unit, hpp);
    }

    #[test]
    fn test_finalize_repeating_fraction_within_tolerance() {
        let breakdown =
            CostCalculator::finalize(Decimal::from(100), Decimal::ZERO, Decimal::from(3)).unwrap();

        let diff = (breakdown.hpp_per_unit * Decimal::from(3) - breakdown.total_cost).abs();
        assert!(diff <= Decimal::new(1, 6));
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = CostCalculator::total_material_cost(&[UsageResult {
            qty_used: Decimal::MAX,
            cost_at_usage: Decimal::from(2),
            ..usage(1, 1)
        }])
        .unwrap_err();
        assert!(matches!(err, HppError::Calculation(_)));
    }

    #[test]
    fn test_cost_summary_consistency() {
        let now = chrono::Utc::now();
        let mut batch = ProductionBatch::start(
            "T1".to_string(),
            "PRD-1".to_string(),
            "P".to_string(),
            Decimal::from(3),
            Decimal::from(62),
            now,
        );
        let usages = vec![
            ProductionMaterialUsage::new(batch.id, Uuid::new_v4(), "M".to_string(), Decimal::from(5), Decimal::from(10)),
            ProductionMaterialUsage::new(batch.id, Uuid::new_v4(), "M".to_string(), Decimal::from(1), Decimal::from(12)),
        ];
        batch
            .complete(Decimal::from(3), Decimal::from(10), Decimal::from(72), Decimal::from(24), now)
            .unwrap();

        let summary = CostSummary::build(&batch, &usages).unwrap();
        assert_eq!(summary.usage_count, 2);
        assert!(summary.is_consistent(Decimal::new(1, 6)));

        let drifted = CostSummary {
            hpp_per_unit: Decimal::from(25),
            ..summary
        };
        assert!(!drifted.is_consistent(Decimal::new(1, 6)));
    }
}
