//! 成本核算配置

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::HppError;

/// 成本核算參數配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostingConfig {
    /// 庫存容差
    ///
    /// FIFO 扣減完所有批次後，剩餘短缺量不超過此值時視為滿足
    /// （吸收小數單位的進位誤差）。
    pub stock_tolerance: Decimal,

    /// 生產批號前綴
    pub production_code_prefix: String,

    /// 物料入庫批號前綴
    pub material_code_prefix: String,

    /// 批號重複時的最大嘗試次數
    pub max_code_attempts: u32,
}

impl Default for CostingConfig {
    fn default() -> Self {
        Self {
            stock_tolerance: Decimal::new(1, 6),
            production_code_prefix: "PRD".to_string(),
            material_code_prefix: "MAT".to_string(),
            max_code_attempts: 5,
        }
    }
}

impl CostingConfig {
    /// 創建預設配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 從 JSON 載入配置，未提供的欄位使用預設值
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HppError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 建構器模式：設置庫存容差
    pub fn with_stock_tolerance(mut self, tolerance: Decimal) -> Self {
        self.stock_tolerance = tolerance;
        self
    }

    /// 建構器模式：設置生產批號前綴
    pub fn with_production_code_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.production_code_prefix = prefix.into();
        self
    }

    /// 建構器模式：設置物料批號前綴
    pub fn with_material_code_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.material_code_prefix = prefix.into();
        self
    }

    /// 建構器模式：設置批號最大嘗試次數
    pub fn with_max_code_attempts(mut self, attempts: u32) -> Self {
        self.max_code_attempts = attempts;
        self
    }

    /// 檢查配置是否合法
    pub fn validate(&self) -> crate::Result<()> {
        if self.stock_tolerance < Decimal::ZERO {
            return Err(HppError::InvalidConfig(format!(
                "stock_tolerance 不可為負數: {}",
                self.stock_tolerance
            )));
        }
        if self.max_code_attempts == 0 {
            return Err(HppError::InvalidConfig(
                "max_code_attempts 至少為 1".to_string(),
            ));
        }
        if self.production_code_prefix.is_empty() || self.material_code_prefix.is_empty() {
            return Err(HppError::InvalidConfig("批號前綴不可為空".to_string()));
        }
        Ok(())
    }

    /// 短缺量是否在容差內
    pub fn within_tolerance(&self, shortage: Decimal) -> bool {
        shortage <= self.stock_tolerance
    }
}
