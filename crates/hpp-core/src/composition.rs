//! 配方（BOM）模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 產品配方
///
/// 每個 (租戶, 產品) 應只有一份 `is_template = false` 的配方作為生效配方。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// 配方ID
    pub id: Uuid,

    /// 租戶
    pub tenant_id: String,

    /// 產品ID
    pub product_id: String,

    /// 是否為範本
    pub is_template: bool,

    /// 配方物料明細
    pub materials: Vec<CompositionMaterial>,
}

impl Composition {
    /// 創建新的配方（非範本）
    pub fn new(tenant_id: String, product_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            product_id,
            is_template: false,
            materials: Vec::new(),
        }
    }

    /// 建構器模式：設置為範本
    pub fn as_template(mut self) -> Self {
        self.is_template = true;
        self
    }

    /// 建構器模式：添加物料
    pub fn with_material(mut self, material_id: String, quantity_per_unit: Decimal) -> Self {
        self.add_material(material_id, quantity_per_unit);
        self
    }

    /// 添加物料明細
    pub fn add_material(&mut self, material_id: String, quantity_per_unit: Decimal) {
        self.materials.push(CompositionMaterial {
            material_id,
            quantity_per_unit,
        });
    }

    /// 是否可用於生產（非範本且有物料）
    pub fn is_usable(&self) -> bool {
        !self.is_template && !self.materials.is_empty()
    }
}

/// 配方物料明細
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionMaterial {
    /// 物料ID
    pub material_id: String,

    /// 每單位產品用量
    pub quantity_per_unit: Decimal,
}

impl CompositionMaterial {
    /// 計算計劃產量所需數量（溢位回傳 `Calculation`）
    pub fn required_for(&self, planned_qty: Decimal) -> crate::Result<Decimal> {
        self.quantity_per_unit
            .checked_mul(planned_qty)
            .ok_or_else(|| {
                crate::HppError::Calculation(format!(
                    "物料 {} 需求量溢位: {} × {}",
                    self.material_id, self.quantity_per_unit, planned_qty
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_builder() {
        let composition = Composition::new("T1".to_string(), "BREAD".to_string())
            .with_material("FLOUR".to_string(), Decimal::new(5, 1))
            .with_material("YEAST".to_string(), Decimal::new(2, 2));

        assert_eq!(composition.materials.len(), 2);
        assert!(composition.is_usable());
        assert_eq!(
            composition.materials[0].required_for(Decimal::from(10)),
            Ok(Decimal::from(5))
        );
    }

    #[test]
    fn test_required_for_reports_overflow() {
        let line = CompositionMaterial {
            material_id: "FLOUR".to_string(),
            quantity_per_unit: Decimal::from(2),
        };

        assert!(matches!(
            line.required_for(Decimal::MAX),
            Err(crate::HppError::Calculation(_))
        ));
    }

    #[test]
    fn test_template_is_not_usable() {
        let template = Composition::new("T1".to_string(), "BREAD".to_string())
            .with_material("FLOUR".to_string(), Decimal::ONE)
            .as_template();
        let empty = Composition::new("T1".to_string(), "BREAD".to_string());

        assert!(!template.is_usable());
        assert!(!empty.is_usable());
    }
}
