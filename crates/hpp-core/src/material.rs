//! 物料庫存批次模型

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 物料庫存批次（一次入庫的物料批）
///
/// `qty_remaining` 只會因 FIFO 消耗而減少；補貨一律建立新批次，
/// 耗盡的批次保留作為稽核軌跡。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialStockBatch {
    /// 批次ID
    pub id: Uuid,

    /// 租戶
    pub tenant_id: String,

    /// 物料ID
    pub material_id: String,

    /// 倉庫
    pub warehouse_id: String,

    /// 批號
    pub batch_code: String,

    /// 入庫總量
    pub qty_total: Decimal,

    /// 剩餘數量
    pub qty_remaining: Decimal,

    /// 單位成本（入庫時固定）
    pub cost_per_unit: Decimal,

    /// 入庫時間
    pub received_at: DateTime<Utc>,

    /// 最後異動時間
    pub updated_at: DateTime<Utc>,
}

impl MaterialStockBatch {
    /// 創建新的物料批次，剩餘數量等於入庫總量
    pub fn new(
        tenant_id: String,
        warehouse_id: String,
        material_id: String,
        batch_code: String,
        qty_total: Decimal,
        cost_per_unit: Decimal,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            material_id,
            warehouse_id,
            batch_code,
            qty_total,
            qty_remaining: qty_total,
            cost_per_unit,
            received_at,
            updated_at: received_at,
        }
    }

    /// 已消耗數量
    pub fn consumed_qty(&self) -> Decimal {
        self.qty_total - self.qty_remaining
    }

    /// 是否仍有剩餘
    pub fn is_available(&self) -> bool {
        self.qty_remaining > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_create_material_batch() {
        let received_at = Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap();
        let batch = MaterialStockBatch::new(
            "T1".to_string(),
            "WH-01".to_string(),
            "FLOUR".to_string(),
            "MAT-001".to_string(),
            Decimal::from(25),
            Decimal::from(12),
            received_at,
        );

        assert_eq!(batch.qty_remaining, batch.qty_total);
        assert_eq!(batch.consumed_qty(), Decimal::ZERO);
        assert_eq!(batch.updated_at, received_at);
        assert!(batch.is_available());
    }

    #[test]
    fn test_exhausted_batch() {
        let mut batch = MaterialStockBatch::new(
            "T1".to_string(),
            "WH-01".to_string(),
            "SUGAR".to_string(),
            "MAT-002".to_string(),
            Decimal::from(10),
            Decimal::from(3),
            Utc::now(),
        );
        batch.qty_remaining = Decimal::ZERO;

        assert!(!batch.is_available());
        assert_eq!(batch.consumed_qty(), Decimal::from(10));
    }
}
