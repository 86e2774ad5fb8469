//! rusqlite 錯誤轉換

use hpp_core::HppError;
use rusqlite::ErrorCode;

/// 將 rusqlite 錯誤轉為儲存層錯誤
pub fn map_sqlite_error(err: rusqlite::Error) -> HppError {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                HppError::Store(format!("資料庫鎖等待逾時: {}", msg))
            }
            ErrorCode::ConstraintViolation => HppError::Store(format!("約束違反: {}", msg)),
            _ => HppError::Store(format!("資料庫查詢失敗: {}", msg)),
        },
        other => HppError::Store(format!("資料庫錯誤: {}", other)),
    }
}

/// 新增帶批號的資料列時使用：唯一約束違反轉為 `DuplicateBatchCode`
pub fn map_insert_error(err: rusqlite::Error, batch_code: &str) -> HppError {
    if is_unique_violation(&err) {
        return HppError::DuplicateBatchCode(batch_code.to_string());
    }
    map_sqlite_error(err)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == ErrorCode::ConstraintViolation && msg.contains("UNIQUE")
    )
}

/// `rusqlite::Result` 轉 `hpp_core::Result`
pub(crate) trait SqliteResultExt<T> {
    fn store_err(self) -> hpp_core::Result<T>;
}

impl<T> SqliteResultExt<T> for rusqlite::Result<T> {
    fn store_err(self) -> hpp_core::Result<T> {
        self.map_err(map_sqlite_error)
    }
}
