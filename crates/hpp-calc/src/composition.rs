//! 配方解析

use hpp_core::{Composition, HppError, UnitOfWork};

/// 生效配方解析器
pub struct CompositionResolver;

impl CompositionResolver {
    /// 解析產品的生效配方
    ///
    /// 取非範本配方中 id 最小者；找不到或該配方沒有任何物料時回傳
    /// `CompositionNotFound`。
    pub fn resolve_active<U: UnitOfWork>(
        uow: &mut U,
        tenant_id: &str,
        product_id: &str,
    ) -> hpp_core::Result<Composition> {
        let candidates = uow.compositions_for_product(tenant_id, product_id)?;

        let active_count = candidates.iter().filter(|c| !c.is_template).count();
        if active_count > 1 {
            tracing::warn!(
                "產品 {} 有 {} 份非範本配方，取 id 最小者",
                product_id,
                active_count
            );
        }

        candidates
            .into_iter()
            .filter(|c| !c.is_template && c.tenant_id == tenant_id)
            .min_by_key(|c| c.id)
            .filter(Composition::is_usable)
            .ok_or_else(|| HppError::CompositionNotFound {
                tenant_id: tenant_id.to_string(),
                product_id: product_id.to_string(),
            })
    }
}
