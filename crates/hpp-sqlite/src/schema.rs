//! 資料表結構
//!
//! 每張表都有自增的 `seq` 作為寫入順序；數量與金額欄位為 Decimal 的文字表示。

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS material_stock_batch (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    id             TEXT NOT NULL UNIQUE,
    tenant_id      TEXT NOT NULL,
    material_id    TEXT NOT NULL,
    warehouse_id   TEXT NOT NULL,
    batch_code     TEXT NOT NULL,
    qty_total      TEXT NOT NULL,
    qty_remaining  TEXT NOT NULL,
    cost_per_unit  TEXT NOT NULL,
    received_at    TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (tenant_id, batch_code)
);

CREATE INDEX IF NOT EXISTS idx_material_stock_batch_fifo
    ON material_stock_batch (tenant_id, warehouse_id, material_id, received_at, seq);

CREATE TABLE IF NOT EXISTS composition (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    id           TEXT NOT NULL UNIQUE,
    tenant_id    TEXT NOT NULL,
    product_id   TEXT NOT NULL,
    is_template  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_composition_product
    ON composition (tenant_id, product_id);

CREATE TABLE IF NOT EXISTS composition_material (
    seq                INTEGER PRIMARY KEY AUTOINCREMENT,
    composition_id     TEXT NOT NULL REFERENCES composition (id) ON DELETE CASCADE,
    material_id        TEXT NOT NULL,
    quantity_per_unit  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS production_batch (
    seq                  INTEGER PRIMARY KEY AUTOINCREMENT,
    id                   TEXT NOT NULL UNIQUE,
    tenant_id            TEXT NOT NULL,
    batch_code           TEXT NOT NULL,
    product_id           TEXT NOT NULL,
    planned_qty          TEXT NOT NULL,
    produced_qty         TEXT NOT NULL,
    status               TEXT NOT NULL,
    started_at           TEXT NOT NULL,
    completed_at         TEXT,
    total_material_cost  TEXT NOT NULL,
    overhead_cost        TEXT NOT NULL,
    total_cost           TEXT NOT NULL,
    hpp_per_unit         TEXT NOT NULL,
    UNIQUE (tenant_id, batch_code)
);

CREATE TABLE IF NOT EXISTS production_material_usage (
    seq                  INTEGER PRIMARY KEY AUTOINCREMENT,
    id                   TEXT NOT NULL UNIQUE,
    production_batch_id  TEXT NOT NULL REFERENCES production_batch (id) ON DELETE CASCADE,
    material_batch_id    TEXT NOT NULL REFERENCES material_stock_batch (id),
    material_id          TEXT NOT NULL,
    qty_used             TEXT NOT NULL,
    cost_at_usage        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_production_batch
    ON production_material_usage (production_batch_id);

CREATE TABLE IF NOT EXISTS product_stock_batch (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    id             TEXT NOT NULL UNIQUE,
    tenant_id      TEXT NOT NULL,
    product_id     TEXT NOT NULL,
    warehouse_id   TEXT NOT NULL,
    batch_code     TEXT NOT NULL,
    source         TEXT NOT NULL,
    reference_id   TEXT NOT NULL REFERENCES production_batch (id),
    qty_total      TEXT NOT NULL,
    qty_remaining  TEXT NOT NULL,
    cost_per_unit  TEXT NOT NULL,
    received_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_product_stock_batch_reference
    ON product_stock_batch (reference_id);

CREATE TABLE IF NOT EXISTS aggregate_inventory (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    id            TEXT NOT NULL UNIQUE,
    tenant_id     TEXT NOT NULL,
    product_id    TEXT NOT NULL,
    warehouse_id  TEXT NOT NULL,
    shelf_id      TEXT NOT NULL,
    quantity      TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (tenant_id, product_id, warehouse_id, shelf_id)
);
"#;

/// 建立所有資料表（已存在則略過）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 7);
    }
}
