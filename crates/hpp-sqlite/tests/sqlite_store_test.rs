//! SQLite 儲存測試

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;
use rust_decimal::Decimal;

use hpp_calc::{
    CompleteProduction, ProductionService, ReceiveMaterial, SequentialBatchCodeGenerator,
    StartProduction,
};
use hpp_core::{
    Composition, CostingConfig, FixedClock, HppError, MaterialStockBatch, ProductionStatus,
    Store, SystemClock, UnitOfWork,
};
use hpp_sqlite::SqliteStore;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap()
}

fn material(code: &str, qty: i64, cost: i64, day: i64) -> MaterialStockBatch {
    MaterialStockBatch::new(
        "T1".to_string(),
        "W".to_string(),
        "M1".to_string(),
        code.to_string(),
        Decimal::from(qty),
        Decimal::from(cost),
        t0() + Duration::days(day),
    )
}

fn remaining(store: &SqliteStore) -> Vec<(String, Decimal)> {
    let mut uow = store.begin().unwrap();
    uow.lock_material_batches("T1", "W", "M1")
        .unwrap()
        .into_iter()
        .map(|b| (b.batch_code, b.qty_remaining))
        .collect()
}

#[test]
fn test_material_batches_come_back_in_fifo_order() {
    let store = SqliteStore::open_in_memory().unwrap();

    let mut uow = store.begin().unwrap();
    uow.insert_material_batch(&material("LATE", 5, 9, 3)).unwrap();
    uow.insert_material_batch(&material("TIE-A", 5, 7, 1)).unwrap();
    uow.insert_material_batch(&material("TIE-B", 5, 8, 1)).unwrap();
    uow.insert_material_batch(&material("EARLY", 5, 6, 0)).unwrap();
    uow.commit().unwrap();

    let codes: Vec<String> = remaining(&store).into_iter().map(|(code, _)| code).collect();
    assert_eq!(codes, vec!["EARLY", "TIE-A", "TIE-B", "LATE"]);
}

#[test]
fn test_values_survive_storage() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut batch = material("B1", 10, 0, 0);
    batch.cost_per_unit = Decimal::new(12345, 3);
    batch.received_at = t0() + Duration::nanoseconds(123_456_789);
    batch.updated_at = batch.received_at;

    let mut uow = store.begin().unwrap();
    uow.insert_material_batch(&batch).unwrap();
    let loaded = uow.lock_material_batches("T1", "W", "M1").unwrap();
    uow.commit().unwrap();

    assert_eq!(loaded, vec![batch]);
}

#[test]
fn test_duplicate_batch_code_is_reported() {
    let store = SqliteStore::open_in_memory().unwrap();

    let mut uow = store.begin().unwrap();
    uow.insert_material_batch(&material("DUP", 5, 1, 0)).unwrap();
    let err = uow.insert_material_batch(&material("DUP", 5, 1, 1)).unwrap_err();
    assert_eq!(err, HppError::DuplicateBatchCode("DUP".to_string()));

    // 同一交易仍可繼續使用
    uow.insert_material_batch(&material("OTHER", 5, 1, 1)).unwrap();
    uow.commit().unwrap();
    assert_eq!(remaining(&store).len(), 2);
}

#[test]
fn test_drop_without_commit_rolls_back() {
    let store = SqliteStore::open_in_memory().unwrap();
    {
        let mut uow = store.begin().unwrap();
        uow.insert_material_batch(&material("B1", 5, 1, 0)).unwrap();
    }
    assert!(remaining(&store).is_empty());
}

#[rstest]
#[case(Decimal::from(4), true)]
#[case(Decimal::from(10), true)]
#[case(Decimal::ZERO, true)]
#[case(Decimal::from(11), false)]
#[case(Decimal::NEGATIVE_ONE, false)]
fn test_remaining_only_decreases(#[case] next: Decimal, #[case] accepted: bool) {
    let store = SqliteStore::open_in_memory().unwrap();
    let batch = material("B1", 10, 1, 0);

    let mut uow = store.begin().unwrap();
    uow.insert_material_batch(&batch).unwrap();
    let result = uow.update_material_remaining(batch.id, next, t0());
    if accepted {
        assert!(result.is_ok());
    } else {
        assert!(matches!(result, Err(HppError::Store(_))));
    }
    uow.commit().unwrap();

    let expected = if accepted { next } else { Decimal::from(10) };
    let left: Vec<Decimal> = remaining(&store).into_iter().map(|(_, qty)| qty).collect();
    // 用罄的批次不再出現在 FIFO 候選中
    if expected.is_zero() {
        assert!(left.is_empty());
    } else {
        assert_eq!(left, vec![expected]);
    }
}

#[test]
fn test_connection_usable_after_panic_inside_unit_of_work() {
    let store = SqliteStore::open_in_memory().unwrap();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut uow = store.begin().unwrap();
        uow.insert_material_batch(&material("B1", 5, 1, 0)).unwrap();
        panic!("中途失敗");
    }));
    assert!(outcome.is_err());

    assert!(remaining(&store).is_empty());
    let mut uow = store.begin().unwrap();
    uow.insert_material_batch(&material("B2", 3, 1, 0)).unwrap();
    uow.commit().unwrap();
    assert_eq!(remaining(&store), vec![("B2".to_string(), Decimal::from(3))]);
}

#[test]
fn test_production_flow_on_sqlite() {
    let clock = FixedClock::new(t0() + Duration::days(5));
    let service = ProductionService::new(
        SqliteStore::open_in_memory().unwrap(),
        clock,
        SequentialBatchCodeGenerator::new(),
        CostingConfig::default(),
    )
    .unwrap();

    service
        .register_composition(
            &Composition::new("T1".to_string(), "P".to_string())
                .with_material("M1".to_string(), Decimal::from(3)),
        )
        .unwrap();
    for (day, qty, cost) in [(0, 10, 5), (1, 10, 7)] {
        service
            .receive_material(
                &ReceiveMaterial::new("T1", "W", "M1", Decimal::from(qty), Decimal::from(cost))
                    .with_received_at(t0() + Duration::days(day)),
            )
            .unwrap();
    }

    let started = service
        .start_production(&StartProduction::new("T1", "W", "P", Decimal::from(5)))
        .unwrap();
    assert_eq!(started.total_material_cost, Decimal::from(85));
    assert_eq!(
        service.available_stock("T1", "W", "M1").unwrap(),
        Decimal::from(5)
    );

    let completed = service
        .complete_production(
            &CompleteProduction::new("T1", started.id, Decimal::from(5), "WH-FG", "S1")
                .with_overhead_cost(Decimal::from(15)),
        )
        .unwrap();
    assert_eq!(completed.status, ProductionStatus::Completed);
    assert_eq!(completed.total_cost, Decimal::from(100));
    assert_eq!(completed.hpp_per_unit, Decimal::from(20));

    let reloaded = service.production_batch("T1", started.id).unwrap();
    assert_eq!(reloaded, completed);

    let summary = service.cost_summary("T1", started.id).unwrap();
    assert_eq!(summary.usage_count, 2);
    assert!(summary.is_consistent(Decimal::ZERO));

    let goods = service.finished_goods("T1", started.id).unwrap();
    assert_eq!(goods.len(), 1);
    assert_eq!(goods[0].cost_per_unit, Decimal::from(20));

    let again = service
        .complete_production(&CompleteProduction::new(
            "T1",
            started.id,
            Decimal::from(5),
            "WH-FG",
            "S1",
        ))
        .unwrap_err();
    assert!(matches!(again, HppError::AlreadyCompleted { .. }));
    assert_eq!(service.finished_goods("T1", started.id).unwrap().len(), 1);

    let mut uow = service.store().begin().unwrap();
    let inventory = uow
        .lock_aggregate_inventory("T1", "P", "WH-FG", "S1")
        .unwrap()
        .unwrap();
    assert_eq!(inventory.quantity, Decimal::from(5));
}

#[test]
fn test_insufficient_stock_leaves_database_untouched() {
    let service = ProductionService::new(
        SqliteStore::open_in_memory().unwrap(),
        FixedClock::new(t0()),
        SequentialBatchCodeGenerator::new(),
        CostingConfig::default(),
    )
    .unwrap();
    service
        .register_composition(
            &Composition::new("T1".to_string(), "P".to_string())
                .with_material("M1".to_string(), Decimal::from(3)),
        )
        .unwrap();
    service
        .receive_material(&ReceiveMaterial::new(
            "T1",
            "W",
            "M1",
            Decimal::from(10),
            Decimal::from(5),
        ))
        .unwrap();

    let err = service
        .start_production(&StartProduction::new("T1", "W", "P", Decimal::from(4)))
        .unwrap_err();
    assert!(matches!(err, HppError::InsufficientStock { .. }));
    assert_eq!(
        service.available_stock("T1", "W", "M1").unwrap(),
        Decimal::from(10)
    );
}

#[test]
fn test_concurrent_connections_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hpp.db");
    let path = path.to_str().unwrap().to_string();

    let codes = Arc::new(SequentialBatchCodeGenerator::new());
    let setup = ProductionService::new(
        SqliteStore::open(&path).unwrap(),
        SystemClock,
        Arc::clone(&codes),
        CostingConfig::default(),
    )
    .unwrap();
    setup
        .register_composition(
            &Composition::new("T1".to_string(), "P".to_string())
                .with_material("M1".to_string(), Decimal::from(2)),
        )
        .unwrap();
    setup
        .receive_material(&ReceiveMaterial::new(
            "T1",
            "W",
            "M1",
            Decimal::from(10),
            Decimal::from(3),
        ))
        .unwrap();

    // 每個執行緒使用獨立連線
    let services: Vec<_> = (0..6)
        .map(|_| {
            ProductionService::new(
                SqliteStore::open(&path).unwrap(),
                SystemClock,
                Arc::clone(&codes),
                CostingConfig::default(),
            )
            .unwrap()
        })
        .collect();

    let handles: Vec<_> = services
        .into_iter()
        .map(|service| {
            thread::spawn(move || {
                service.start_production(&StartProduction::new("T1", "W", "P", Decimal::ONE))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(HppError::InsufficientStock { .. })))
        .count();
    assert_eq!(succeeded, 5);
    assert_eq!(short, 1);
    assert_eq!(
        setup.available_stock("T1", "W", "M1").unwrap(),
        Decimal::ZERO
    );
}

#[test]
fn test_shortage_on_second_material_rolls_back_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hpp.db");
    let path = path.to_str().unwrap().to_string();

    let service = ProductionService::new(
        SqliteStore::open(&path).unwrap(),
        FixedClock::new(t0()),
        SequentialBatchCodeGenerator::new(),
        CostingConfig::default(),
    )
    .unwrap();
    // 每單位 P2 需要 2 個 M1 與 1 個 M2；M1 足夠、M2 不足
    service
        .register_composition(
            &Composition::new("T1".to_string(), "P2".to_string())
                .with_material("M1".to_string(), Decimal::from(2))
                .with_material("M2".to_string(), Decimal::ONE),
        )
        .unwrap();
    for (material_id, qty) in [("M1", 10), ("M2", 2)] {
        service
            .receive_material(&ReceiveMaterial::new(
                "T1",
                "W",
                material_id,
                Decimal::from(qty),
                Decimal::from(4),
            ))
            .unwrap();
    }

    let err = service
        .start_production(&StartProduction::new("T1", "W", "P2", Decimal::from(3)))
        .unwrap_err();
    assert!(matches!(
        err,
        HppError::InsufficientStock { ref material_id, .. } if material_id == "M2"
    ));

    assert_eq!(
        service.available_stock("T1", "W", "M1").unwrap(),
        Decimal::from(10)
    );
    assert_eq!(
        service.available_stock("T1", "W", "M2").unwrap(),
        Decimal::from(2)
    );

    let conn = rusqlite::Connection::open(&path).unwrap();
    for table in ["production_batch", "production_material_usage"] {
        let rows: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0, "{} 應為空", table);
    }
}
