//! 生產成本示例：入庫 → 開工 → 完工

use chrono::{Duration, TimeZone, Utc};
use hpp_calc::{
    CompleteProduction, ProductionService, ReceiveMaterial, SequentialBatchCodeGenerator,
    StartProduction,
};
use hpp_core::{Composition, CostingConfig, FixedClock};
use hpp_store::MemoryStore;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== 生產成本示例 ===\n");

    let day1 = Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap();
    let clock = FixedClock::new(day1);
    let service = ProductionService::new(
        MemoryStore::new(),
        clock,
        SequentialBatchCodeGenerator::new(),
        CostingConfig::default(),
    )?;

    // 麵包：每個需要 0.25 kg 麵粉、0.5 個雞蛋
    service.register_composition(
        &Composition::new("TOKO-1".to_string(), "ROTI".to_string())
            .with_material("TEPUNG".to_string(), Decimal::new(25, 2))
            .with_material("TELUR".to_string(), Decimal::new(5, 1)),
    )?;

    let receipts = [
        ("TEPUNG", 10, 12_000, 0),
        ("TEPUNG", 20, 13_500, 1),
        ("TELUR", 30, 2_000, 0),
    ];
    for (material, qty, cost, offset) in receipts {
        let batch = service.receive_material(
            &ReceiveMaterial::new(
                "TOKO-1",
                "GUDANG",
                material,
                Decimal::from(qty),
                Decimal::from(cost),
            )
            .with_received_at(day1 + Duration::days(offset)),
        )?;
        println!(
            "入庫: {} {} 單位 @ {} ({})",
            material, qty, cost, batch.batch_code
        );
    }

    let started = service.start_production(&StartProduction::new(
        "TOKO-1",
        "GUDANG",
        "ROTI",
        Decimal::from(48),
    ))?;
    println!(
        "\n開工: {} 計劃 {} 個，物料成本 {}",
        started.batch_code, started.planned_qty, started.total_material_cost
    );

    println!("\n耗用明細:");
    for usage in service.material_usages("TOKO-1", started.id)? {
        println!(
            "  - {}: {} @ {} = {}",
            usage.material_id,
            usage.qty_used,
            usage.cost_at_usage,
            usage.line_cost()?
        );
    }

    let completed = service.complete_production(
        &CompleteProduction::new("TOKO-1", started.id, Decimal::from(45), "GUDANG-JADI", "RAK-A")
            .with_overhead_cost(Decimal::from(50_000)),
    )?;
    println!(
        "\n完工: 產出 {} 個，總成本 {}，單位成本 {}",
        completed.produced_qty,
        completed.total_cost,
        completed.hpp_per_unit.round_dp(2)
    );

    let summary = service.cost_summary("TOKO-1", started.id)?;
    println!(
        "成本追溯一致: {}",
        summary.is_consistent(service.config().stock_tolerance)
    );

    for goods in service.finished_goods("TOKO-1", started.id)? {
        println!(
            "成品批次: {} 數量 {} 單位成本 {}",
            goods.batch_code,
            goods.qty_total,
            goods.cost_per_unit.round_dp(2)
        );
    }

    Ok(())
}
