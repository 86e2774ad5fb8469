//! 開工前需求試算示例（SQLite 記憶體資料庫）

use hpp_calc::{ProductionService, ReceiveMaterial, SequentialBatchCodeGenerator, StartProduction};
use hpp_core::{Composition, CostingConfig, HppError, SystemClock};
use hpp_sqlite::SqliteStore;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("=== 需求試算示例 ===\n");

    let service = ProductionService::new(
        SqliteStore::open_in_memory()?,
        SystemClock,
        SequentialBatchCodeGenerator::new(),
        CostingConfig::default(),
    )?;

    service.register_composition(
        &Composition::new("T1".to_string(), "KURSI".to_string())
            .with_material("KAYU".to_string(), Decimal::from(4))
            .with_material("PAKU".to_string(), Decimal::from(12)),
    )?;
    service.receive_material(&ReceiveMaterial::new(
        "T1",
        "W1",
        "KAYU",
        Decimal::from(30),
        Decimal::from(25_000),
    ))?;
    service.receive_material(&ReceiveMaterial::new(
        "T1",
        "W1",
        "PAKU",
        Decimal::from(100),
        Decimal::from(150),
    ))?;

    let planned = Decimal::from(10);
    let preview = service.preview_requirements("T1", "W1", "KURSI", planned)?;

    println!("計劃產量: {}", preview.planned_qty);
    for line in &preview.lines {
        println!(
            "  - {}: 需求 {}，可用 {}，短缺 {}，試算成本 {}",
            line.material_id, line.required, line.available, line.shortage, line.estimated_cost
        );
    }

    if preview.is_feasible() {
        println!("\n物料足夠，可以開工");
        return Ok(());
    }

    println!("\n物料不足，開工會被拒絕:");
    match service.start_production(&StartProduction::new("T1", "W1", "KURSI", planned)) {
        Err(HppError::InsufficientStock {
            material_id,
            missing,
            ..
        }) => println!("  {} 缺少 {}", material_id, missing),
        Err(other) => return Err(other.into()),
        Ok(batch) => println!("  意外開工成功: {}", batch.batch_code),
    }

    Ok(())
}
