//! 髒標記追蹤（unit of work 的寫入集合）

use std::collections::HashSet;

use uuid::Uuid;

/// 資料列種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    MaterialBatch,
    Composition,
    ProductionBatch,
    MaterialUsage,
    ProductStockBatch,
    AggregateInventory,
}

/// 髒標記追蹤器
#[derive(Debug, Default)]
pub struct DirtyTracker {
    dirty_records: HashSet<(RecordKind, Uuid)>,
}

impl DirtyTracker {
    /// 創建新的追蹤器
    pub fn new() -> Self {
        Self::default()
    }

    /// 標記資料列為髒
    pub fn mark_dirty(&mut self, kind: RecordKind, id: Uuid) {
        self.dirty_records.insert((kind, id));
    }

    /// 清除所有髒標記
    pub fn clear(&mut self) {
        self.dirty_records.clear();
    }

    /// 髒資料列數
    pub fn len(&self) -> usize {
        self.dirty_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty_records.is_empty()
    }

    /// 某種類的髒資料列數
    pub fn count_of(&self, kind: RecordKind) -> usize {
        self.dirty_records.iter().filter(|(k, _)| *k == kind).count()
    }
}
