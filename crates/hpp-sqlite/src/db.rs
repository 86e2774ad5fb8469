//! SQLite 連線設定
//!
//! 扣料一律在 `BEGIN IMMEDIATE` 內完成，因此同一個資料庫檔案同時只有一個
//! unit of work 在寫；其他連線在 `BEGIN` 時排隊，最多等 [`WRITE_LOCK_WAIT_MS`]。

use std::time::Duration;

use rusqlite::Connection;

/// 等待寫入鎖的上限（毫秒），逾時回傳 `SQLITE_BUSY`
pub const WRITE_LOCK_WAIT_MS: u64 = 5_000;

/// 套用連線層級的設定
///
/// 耗用記錄指向生產批次與物料批次，靠外鍵擋住孤兒記錄；
/// SQLite 的外鍵開關與等待時間都不會寫進檔案，每條連線都要重設。
pub fn prepare_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_millis(WRITE_LOCK_WAIT_MS))?;
    Ok(())
}

/// 開啟資料庫檔案並套用連線設定
pub fn open_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    prepare_connection(&conn)?;
    Ok(conn)
}
