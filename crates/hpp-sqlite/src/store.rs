//! SQLite 交易儲存
//!
//! 每個 [`SqliteUnitOfWork`] 以 `BEGIN IMMEDIATE` 開始，立即取得資料庫寫入鎖；
//! 同一連線上的 unit of work 由 Mutex 序列化，跨連線（或跨行程）則由 SQLite
//! 的寫入鎖加上 busy_timeout 序列化。未提交就被丟棄時送出 `ROLLBACK`。

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hpp_core::{
    AggregateInventory, Composition, CompositionMaterial, HppError, MaterialStockBatch,
    ProductStockBatch, ProductionBatch, ProductionMaterialUsage, Result, Store, UnitOfWork,
};

use crate::codec::{get_decimal, get_enum, get_opt_ts, get_ts, get_uuid, ts};
use crate::db::{open_connection, prepare_connection};
use crate::error::{map_insert_error, SqliteResultExt};
use crate::schema::ensure_schema;

const MATERIAL_BATCH_COLUMNS: &str = "id, tenant_id, material_id, warehouse_id, batch_code, \
     qty_total, qty_remaining, cost_per_unit, received_at, updated_at";

const PRODUCTION_BATCH_COLUMNS: &str = "id, tenant_id, batch_code, product_id, planned_qty, \
     produced_qty, status, started_at, completed_at, total_material_cost, overhead_cost, \
     total_cost, hpp_per_unit";

const USAGE_COLUMNS: &str =
    "id, production_batch_id, material_batch_id, material_id, qty_used, cost_at_usage";

const PRODUCT_BATCH_COLUMNS: &str = "id, tenant_id, product_id, warehouse_id, batch_code, \
     source, reference_id, qty_total, qty_remaining, cost_per_unit, received_at";

const INVENTORY_COLUMNS: &str =
    "id, tenant_id, product_id, warehouse_id, shelf_id, quantity, updated_at";

/// SQLite 儲存
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 開啟（或建立）資料庫檔案並確保資料表存在
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_connection(db_path).store_err()?;
        ensure_schema(&conn).store_err()?;
        info!("SQLite 儲存已開啟: {}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 記憶體資料庫（測試與試算用）
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().store_err()?;
        prepare_connection(&conn).store_err()?;
        ensure_schema(&conn).store_err()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteStore {
    type Tx<'a> = SqliteUnitOfWork<'a>;

    fn begin(&self) -> Result<SqliteUnitOfWork<'_>> {
        let conn = self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("連線鎖曾因 panic 中毒，繼續使用該連線");
            poisoned.into_inner()
        });
        if !conn.is_autocommit() {
            // 上一個 unit of work 未能送出 ROLLBACK
            warn!("連線仍在交易中，先執行 ROLLBACK");
            conn.execute_batch("ROLLBACK").store_err()?;
        }
        conn.execute_batch("BEGIN IMMEDIATE").store_err()?;
        Ok(SqliteUnitOfWork {
            conn,
            dirty: false,
            finished: false,
        })
    }
}

/// SQLite unit of work
pub struct SqliteUnitOfWork<'a> {
    conn: MutexGuard<'a, Connection>,
    dirty: bool,
    finished: bool,
}

impl Drop for SqliteUnitOfWork<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.dirty {
            warn!("交易未提交，執行 ROLLBACK");
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!("ROLLBACK 失敗: {}", e);
        }
    }
}

impl SqliteUnitOfWork<'_> {
    fn composition_lines(&self, composition_id: Uuid) -> Result<Vec<CompositionMaterial>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT material_id, quantity_per_unit FROM composition_material \
                 WHERE composition_id = ?1 ORDER BY seq",
            )
            .store_err()?;
        let rows = stmt
            .query_map(params![composition_id.to_string()], |row| {
                Ok(CompositionMaterial {
                    material_id: row.get(0)?,
                    quantity_per_unit: get_decimal(row, 1)?,
                })
            })
            .store_err()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().store_err()
    }

    fn ensure_changed(changed: usize, entity: &'static str, id: Uuid) -> Result<()> {
        if changed == 0 {
            return Err(HppError::not_found(entity, id));
        }
        Ok(())
    }
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn insert_material_batch(&mut self, batch: &MaterialStockBatch) -> Result<()> {
        self.dirty = true;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO material_stock_batch ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    MATERIAL_BATCH_COLUMNS
                ),
                params![
                    batch.id.to_string(),
                    batch.tenant_id,
                    batch.material_id,
                    batch.warehouse_id,
                    batch.batch_code,
                    batch.qty_total.to_string(),
                    batch.qty_remaining.to_string(),
                    batch.cost_per_unit.to_string(),
                    ts(&batch.received_at),
                    ts(&batch.updated_at),
                ],
            )
            .map_err(|e| map_insert_error(e, &batch.batch_code))?;
        Ok(())
    }

    fn lock_material_batches(
        &mut self,
        tenant_id: &str,
        warehouse_id: &str,
        material_id: &str,
    ) -> Result<Vec<MaterialStockBatch>> {
        // 整個資料庫已在 BEGIN IMMEDIATE 時鎖定，這裡只需依序讀取
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM material_stock_batch \
                 WHERE tenant_id = ?1 AND warehouse_id = ?2 AND material_id = ?3 \
                 ORDER BY received_at, seq",
                MATERIAL_BATCH_COLUMNS
            ))
            .store_err()?;
        let rows = stmt
            .query_map(params![tenant_id, warehouse_id, material_id], map_material_batch)
            .store_err()?;
        let batches = rows.collect::<rusqlite::Result<Vec<_>>>().store_err()?;
        Ok(batches.into_iter().filter(|b| b.is_available()).collect())
    }

    fn update_material_remaining(
        &mut self,
        batch_id: Uuid,
        qty_remaining: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.dirty = true;
        let current: Option<(String, Decimal)> = self
            .conn
            .query_row(
                "SELECT batch_code, qty_remaining FROM material_stock_batch WHERE id = ?1",
                params![batch_id.to_string()],
                |row| Ok((row.get(0)?, get_decimal(row, 1)?)),
            )
            .optional()
            .store_err()?;
        let (batch_code, previous) =
            current.ok_or_else(|| HppError::not_found("material batch", batch_id))?;

        if qty_remaining < Decimal::ZERO || qty_remaining > previous {
            return Err(HppError::Store(format!(
                "批次 {} 剩餘量只能遞減: {} → {}",
                batch_code, previous, qty_remaining
            )));
        }

        self.conn
            .execute(
                "UPDATE material_stock_batch SET qty_remaining = ?1, updated_at = ?2 WHERE id = ?3",
                params![qty_remaining.to_string(), ts(&updated_at), batch_id.to_string()],
            )
            .store_err()?;
        Ok(())
    }

    fn insert_composition(&mut self, composition: &Composition) -> Result<()> {
        self.dirty = true;
        self.conn
            .execute(
                "INSERT INTO composition (id, tenant_id, product_id, is_template) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    composition.id.to_string(),
                    composition.tenant_id,
                    composition.product_id,
                    composition.is_template,
                ],
            )
            .store_err()?;

        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO composition_material (composition_id, material_id, quantity_per_unit) \
                 VALUES (?1, ?2, ?3)",
            )
            .store_err()?;
        for line in &composition.materials {
            stmt.execute(params![
                composition.id.to_string(),
                line.material_id,
                line.quantity_per_unit.to_string(),
            ])
            .store_err()?;
        }
        Ok(())
    }

    fn compositions_for_product(
        &mut self,
        tenant_id: &str,
        product_id: &str,
    ) -> Result<Vec<Composition>> {
        let headers = {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT id, tenant_id, product_id, is_template FROM composition \
                     WHERE tenant_id = ?1 AND product_id = ?2 ORDER BY seq",
                )
                .store_err()?;
            let rows = stmt
                .query_map(params![tenant_id, product_id], |row| {
                    Ok(Composition {
                        id: get_uuid(row, 0)?,
                        tenant_id: row.get(1)?,
                        product_id: row.get(2)?,
                        is_template: row.get(3)?,
                        materials: Vec::new(),
                    })
                })
                .store_err()?;
            rows.collect::<rusqlite::Result<Vec<_>>>().store_err()?
        };

        headers
            .into_iter()
            .map(|mut composition| -> Result<Composition> {
                composition.materials = self.composition_lines(composition.id)?;
                Ok(composition)
            })
            .collect()
    }

    fn insert_production_batch(&mut self, batch: &ProductionBatch) -> Result<()> {
        self.dirty = true;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO production_batch ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    PRODUCTION_BATCH_COLUMNS
                ),
                params![
                    batch.id.to_string(),
                    batch.tenant_id,
                    batch.batch_code,
                    batch.product_id,
                    batch.planned_qty.to_string(),
                    batch.produced_qty.to_string(),
                    batch.status.as_str(),
                    ts(&batch.started_at),
                    batch.completed_at.as_ref().map(ts),
                    batch.total_material_cost.to_string(),
                    batch.overhead_cost.to_string(),
                    batch.total_cost.to_string(),
                    batch.hpp_per_unit.to_string(),
                ],
            )
            .map_err(|e| map_insert_error(e, &batch.batch_code))?;
        Ok(())
    }

    fn lock_production_batch(
        &mut self,
        tenant_id: &str,
        batch_id: Uuid,
    ) -> Result<Option<ProductionBatch>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM production_batch WHERE id = ?1 AND tenant_id = ?2",
                    PRODUCTION_BATCH_COLUMNS
                ),
                params![batch_id.to_string(), tenant_id],
                map_production_batch,
            )
            .optional()
            .store_err()
    }

    fn update_production_batch(&mut self, batch: &ProductionBatch) -> Result<()> {
        self.dirty = true;
        let changed = self
            .conn
            .execute(
                "UPDATE production_batch SET produced_qty = ?1, status = ?2, completed_at = ?3, \
                 total_material_cost = ?4, overhead_cost = ?5, total_cost = ?6, hpp_per_unit = ?7 \
                 WHERE id = ?8",
                params![
                    batch.produced_qty.to_string(),
                    batch.status.as_str(),
                    batch.completed_at.as_ref().map(ts),
                    batch.total_material_cost.to_string(),
                    batch.overhead_cost.to_string(),
                    batch.total_cost.to_string(),
                    batch.hpp_per_unit.to_string(),
                    batch.id.to_string(),
                ],
            )
            .store_err()?;
        Self::ensure_changed(changed, "production batch", batch.id)
    }

    fn insert_material_usage(&mut self, usage: &ProductionMaterialUsage) -> Result<()> {
        self.dirty = true;
        let parent_exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM production_batch WHERE id = ?1)",
                params![usage.production_batch_id.to_string()],
                |row| row.get(0),
            )
            .store_err()?;
        if !parent_exists {
            return Err(HppError::not_found(
                "production batch",
                usage.production_batch_id,
            ));
        }

        self.conn
            .execute(
                &format!(
                    "INSERT INTO production_material_usage ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    USAGE_COLUMNS
                ),
                params![
                    usage.id.to_string(),
                    usage.production_batch_id.to_string(),
                    usage.material_batch_id.to_string(),
                    usage.material_id,
                    usage.qty_used.to_string(),
                    usage.cost_at_usage.to_string(),
                ],
            )
            .store_err()?;
        Ok(())
    }

    fn material_usages(
        &mut self,
        production_batch_id: Uuid,
    ) -> Result<Vec<ProductionMaterialUsage>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM production_material_usage \
                 WHERE production_batch_id = ?1 ORDER BY seq",
                USAGE_COLUMNS
            ))
            .store_err()?;
        let rows = stmt
            .query_map(params![production_batch_id.to_string()], map_usage)
            .store_err()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().store_err()
    }

    fn insert_product_stock_batch(&mut self, batch: &ProductStockBatch) -> Result<()> {
        self.dirty = true;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO product_stock_batch ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    PRODUCT_BATCH_COLUMNS
                ),
                params![
                    batch.id.to_string(),
                    batch.tenant_id,
                    batch.product_id,
                    batch.warehouse_id,
                    batch.batch_code,
                    batch.source.as_str(),
                    batch.reference_id.to_string(),
                    batch.qty_total.to_string(),
                    batch.qty_remaining.to_string(),
                    batch.cost_per_unit.to_string(),
                    ts(&batch.received_at),
                ],
            )
            .store_err()?;
        Ok(())
    }

    fn product_stock_batches(&mut self, reference_id: Uuid) -> Result<Vec<ProductStockBatch>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM product_stock_batch WHERE reference_id = ?1 ORDER BY seq",
                PRODUCT_BATCH_COLUMNS
            ))
            .store_err()?;
        let rows = stmt
            .query_map(params![reference_id.to_string()], map_product_batch)
            .store_err()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().store_err()
    }

    fn lock_aggregate_inventory(
        &mut self,
        tenant_id: &str,
        product_id: &str,
        warehouse_id: &str,
        shelf_id: &str,
    ) -> Result<Option<AggregateInventory>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM aggregate_inventory \
                     WHERE tenant_id = ?1 AND product_id = ?2 AND warehouse_id = ?3 AND shelf_id = ?4",
                    INVENTORY_COLUMNS
                ),
                params![tenant_id, product_id, warehouse_id, shelf_id],
                map_inventory,
            )
            .optional()
            .store_err()
    }

    fn insert_aggregate_inventory(&mut self, inventory: &AggregateInventory) -> Result<()> {
        self.dirty = true;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO aggregate_inventory ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    INVENTORY_COLUMNS
                ),
                params![
                    inventory.id.to_string(),
                    inventory.tenant_id,
                    inventory.product_id,
                    inventory.warehouse_id,
                    inventory.shelf_id,
                    inventory.quantity.to_string(),
                    ts(&inventory.updated_at),
                ],
            )
            .store_err()?;
        Ok(())
    }

    fn update_aggregate_quantity(
        &mut self,
        inventory_id: Uuid,
        quantity: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.dirty = true;
        let changed = self
            .conn
            .execute(
                "UPDATE aggregate_inventory SET quantity = ?1, updated_at = ?2 WHERE id = ?3",
                params![quantity.to_string(), ts(&updated_at), inventory_id.to_string()],
            )
            .store_err()?;
        Self::ensure_changed(changed, "aggregate inventory", inventory_id)
    }

    fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT").store_err()?;
        self.finished = true;
        debug!("交易已提交");
        Ok(())
    }
}

fn map_material_batch(row: &Row<'_>) -> rusqlite::Result<MaterialStockBatch> {
    Ok(MaterialStockBatch {
        id: get_uuid(row, 0)?,
        tenant_id: row.get(1)?,
        material_id: row.get(2)?,
        warehouse_id: row.get(3)?,
        batch_code: row.get(4)?,
        qty_total: get_decimal(row, 5)?,
        qty_remaining: get_decimal(row, 6)?,
        cost_per_unit: get_decimal(row, 7)?,
        received_at: get_ts(row, 8)?,
        updated_at: get_ts(row, 9)?,
    })
}

fn map_production_batch(row: &Row<'_>) -> rusqlite::Result<ProductionBatch> {
    Ok(ProductionBatch {
        id: get_uuid(row, 0)?,
        tenant_id: row.get(1)?,
        batch_code: row.get(2)?,
        product_id: row.get(3)?,
        planned_qty: get_decimal(row, 4)?,
        produced_qty: get_decimal(row, 5)?,
        status: get_enum(row, 6)?,
        started_at: get_ts(row, 7)?,
        completed_at: get_opt_ts(row, 8)?,
        total_material_cost: get_decimal(row, 9)?,
        overhead_cost: get_decimal(row, 10)?,
        total_cost: get_decimal(row, 11)?,
        hpp_per_unit: get_decimal(row, 12)?,
    })
}

fn map_usage(row: &Row<'_>) -> rusqlite::Result<ProductionMaterialUsage> {
    Ok(ProductionMaterialUsage {
        id: get_uuid(row, 0)?,
        production_batch_id: get_uuid(row, 1)?,
        material_batch_id: get_uuid(row, 2)?,
        material_id: row.get(3)?,
        qty_used: get_decimal(row, 4)?,
        cost_at_usage: get_decimal(row, 5)?,
    })
}

fn map_product_batch(row: &Row<'_>) -> rusqlite::Result<ProductStockBatch> {
    Ok(ProductStockBatch {
        id: get_uuid(row, 0)?,
        tenant_id: row.get(1)?,
        product_id: row.get(2)?,
        warehouse_id: row.get(3)?,
        batch_code: row.get(4)?,
        source: get_enum(row, 5)?,
        reference_id: get_uuid(row, 6)?,
        qty_total: get_decimal(row, 7)?,
        qty_remaining: get_decimal(row, 8)?,
        cost_per_unit: get_decimal(row, 9)?,
        received_at: get_ts(row, 10)?,
    })
}

fn map_inventory(row: &Row<'_>) -> rusqlite::Result<AggregateInventory> {
    Ok(AggregateInventory {
        id: get_uuid(row, 0)?,
        tenant_id: row.get(1)?,
        product_id: row.get(2)?,
        warehouse_id: row.get(3)?,
        shelf_id: row.get(4)?,
        quantity: get_decimal(row, 5)?,
        updated_at: get_ts(row, 6)?,
    })
}
